use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::matching::CandidateSource;
use crate::model::{Candidate, RawCandidate};
use crate::util::read_json;

pub(crate) const DEFAULT_MAX_CANDIDATES: usize = 20;

/// Reads a JSON array of raw candidate records.
pub(crate) fn load_catalog(path: &Path) -> Result<Vec<Candidate>> {
    let raw = read_json::<Vec<RawCandidate>>(path)?;
    Ok(raw.into_iter().map(Candidate::from).collect())
}

struct IndexedCandidate {
    candidate: Candidate,
    terms: HashSet<String>,
}

/// In-memory candidate pool answering keyword queries.
pub(crate) struct CatalogSource {
    entries: Vec<IndexedCandidate>,
    max_candidates: usize,
    full_pool: bool,
}

impl CatalogSource {
    /// Keeps the first record per identifier; records without one are dropped.
    pub(crate) fn new(candidates: Vec<Candidate>, max_candidates: usize, full_pool: bool) -> Self {
        let mut seen = HashSet::<String>::new();
        let mut entries = Vec::<IndexedCandidate>::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.candidate_id.is_empty() {
                continue;
            }
            if !seen.insert(candidate.candidate_id.clone()) {
                warn!(candidate_id = %candidate.candidate_id, "duplicate catalog identifier ignored");
                continue;
            }
            let terms = term_set(&candidate.descriptor_text);
            entries.push(IndexedCandidate { candidate, terms });
        }

        Self {
            entries,
            max_candidates: max_candidates.max(1),
            full_pool,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CandidateSource for CatalogSource {
    fn retrieve(&self, query: &str) -> Result<Vec<Candidate>> {
        if self.full_pool {
            return Ok(self
                .entries
                .iter()
                .map(|entry| entry.candidate.clone())
                .collect());
        }

        let query_terms = term_set(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self
            .entries
            .iter()
            .filter_map(|entry| {
                let overlap = entry.terms.intersection(&query_terms).count();
                (overlap > 0).then_some((overlap, entry))
            })
            .collect::<Vec<(usize, &IndexedCandidate)>>();

        hits.sort_by(|left, right| {
            right.0.cmp(&left.0).then_with(|| {
                left.1
                    .candidate
                    .candidate_id
                    .cmp(&right.1.candidate.candidate_id)
            })
        });
        hits.truncate(self.max_candidates);

        debug!(query, hits = hits.len(), "catalog retrieval");

        Ok(hits
            .into_iter()
            .map(|(_, entry)| entry.candidate.clone())
            .collect())
    }
}

fn term_set(text: &str) -> HashSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}
