use std::cell::Cell;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::commands::embed::{load_cached_embedding, upsert_text_embedding};
use crate::matching::{Embedder, LocalEmbedder};
use crate::semantic::{SemanticModelConfig, embedding_text_hash};

/// Read-through embedding cache: hits come from SQLite, misses are embedded
/// locally and written back.
pub(crate) struct StoreEmbedder<'conn> {
    connection: &'conn Connection,
    model: SemanticModelConfig,
    fallback: LocalEmbedder,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<'conn> StoreEmbedder<'conn> {
    pub(crate) fn new(connection: &'conn Connection, model: SemanticModelConfig) -> Self {
        let fallback = LocalEmbedder::new(model.dimensions);
        Self {
            connection,
            model,
            fallback,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.get()
    }

    pub(crate) fn misses(&self) -> usize {
        self.misses.get()
    }
}

impl Embedder for StoreEmbedder<'_> {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let hashes = texts
            .iter()
            .map(|text| embedding_text_hash(text))
            .collect::<Vec<String>>();

        let mut vectors = Vec::<Option<Vec<f32>>>::with_capacity(texts.len());
        let mut missing = Vec::<usize>::new();
        for (index, hash) in hashes.iter().enumerate() {
            let cached = load_cached_embedding(
                self.connection,
                hash,
                &self.model.model_id,
                self.model.dimensions,
            )?;
            if cached.is_none() {
                missing.push(index);
            }
            vectors.push(cached);
        }

        self.hits.set(self.hits.get() + texts.len() - missing.len());
        self.misses.set(self.misses.get() + missing.len());

        if !missing.is_empty() {
            let batch = missing
                .iter()
                .map(|index| texts[*index].clone())
                .collect::<Vec<String>>();
            let computed = self.fallback.embed_batch(&batch)?;

            let tx = self
                .connection
                .unchecked_transaction()
                .context("failed to open embedding cache transaction")?;
            for (index, vector) in missing.iter().zip(computed) {
                upsert_text_embedding(&tx, &hashes[*index], &self.model.model_id, &vector)?;
                vectors[*index] = Some(vector);
            }
            tx.commit()?;
        }

        Ok(vectors.into_iter().map(Option::unwrap_or_default).collect())
    }
}
