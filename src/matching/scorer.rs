use anyhow::Result;

use super::error::MatchError;
use crate::model::{Candidate, ScoredCandidate, TextUnit};
use crate::semantic::{cosine_similarity, embed_text_local, lexical_jaccard};

/// Text embedding provider: one vector per input string, in input order.
pub trait Embedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Offline hashed-feature embedder.
#[derive(Debug, Clone, Copy)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for LocalEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| embed_text_local(text, self.dimensions))
            .collect())
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

pub struct SimilarityScorer<E> {
    embedder: E,
    lexical_weight: f64,
}

impl<E: Embedder> SimilarityScorer<E> {
    pub fn new(embedder: E, lexical_weight: f64) -> Self {
        Self {
            embedder,
            lexical_weight: lexical_weight.clamp(0.0, 1.0),
        }
    }

    /// One score in `[0, 1]` per descriptor, same order as the input.
    pub fn score_all(&self, unit_text: &str, descriptors: &[String]) -> Result<Vec<f64>> {
        let mut batch = Vec::<String>::with_capacity(descriptors.len() + 1);
        batch.push(unit_text.to_string());
        batch.extend(descriptors.iter().cloned());

        let vectors = self.embed_checked(&batch)?;
        let (unit_vector, descriptor_vectors) = vectors.split_at(1);

        Ok(descriptors
            .iter()
            .zip(descriptor_vectors)
            .map(|(descriptor, vector)| self.blend(unit_text, descriptor, &unit_vector[0], vector))
            .collect())
    }

    /// Scores a unit's pool, reusing candidate embeddings whose dimension matches.
    pub fn score_candidates(
        &self,
        unit: &TextUnit,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<ScoredCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if candidates.iter().all(|candidate| candidate.embedding.is_none()) {
            let descriptors = candidates
                .iter()
                .map(|candidate| candidate.descriptor_text.clone())
                .collect::<Vec<String>>();
            let scores = self.score_all(&unit.content, &descriptors)?;
            return Ok(candidates
                .into_iter()
                .zip(scores)
                .map(|(candidate, score)| ScoredCandidate {
                    candidate,
                    score,
                    source_unit_id: unit.unit_id.clone(),
                })
                .collect());
        }

        let mut batch = vec![unit.content.clone()];
        let mut pending = Vec::<usize>::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if candidate.embedding.is_none() {
                pending.push(index);
                batch.push(candidate.descriptor_text.clone());
            }
        }

        let mut vectors = self.embed_checked(&batch)?.into_iter();
        let unit_vector = vectors.next().unwrap_or_default();
        let mut computed = vec![None::<Vec<f32>>; candidates.len()];
        for (index, vector) in pending.iter().zip(vectors) {
            computed[*index] = Some(vector);
        }

        let stale = candidates
            .iter()
            .enumerate()
            .filter(|(index, candidate)| {
                computed[*index].is_none()
                    && candidate
                        .embedding
                        .as_ref()
                        .is_some_and(|vector| vector.len() != unit_vector.len())
            })
            .map(|(index, _)| index)
            .collect::<Vec<usize>>();
        if !stale.is_empty() {
            let texts = stale
                .iter()
                .map(|index| candidates[*index].descriptor_text.clone())
                .collect::<Vec<String>>();
            for (index, vector) in stale.iter().zip(self.embed_checked(&texts)?) {
                computed[*index] = Some(vector);
            }
        }

        Ok(candidates
            .into_iter()
            .zip(computed)
            .map(|(candidate, vector)| {
                let vector = vector
                    .as_deref()
                    .or(candidate.embedding.as_deref())
                    .unwrap_or_default();
                let score = self.blend(
                    &unit.content,
                    &candidate.descriptor_text,
                    &unit_vector,
                    vector,
                );
                ScoredCandidate {
                    candidate,
                    score,
                    source_unit_id: unit.unit_id.clone(),
                }
            })
            .collect())
    }

    fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(MatchError::EmbeddingShape {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }
        Ok(vectors)
    }

    fn blend(&self, unit_text: &str, descriptor: &str, unit_vector: &[f32], vector: &[f32]) -> f64 {
        let semantic = cosine_similarity(unit_vector, vector).clamp(0.0, 1.0);
        if self.lexical_weight <= 0.0 {
            return semantic;
        }

        let lexical = lexical_jaccard(unit_text, descriptor);
        ((1.0 - self.lexical_weight) * semantic + self.lexical_weight * lexical).clamp(0.0, 1.0)
    }
}
