use std::collections::BTreeMap;

use serde::Serialize;

use crate::matching::{MatchConfig, MatchSummary, PosthocReport};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub(super) struct CacheStats {
    pub(super) hits: usize,
    pub(super) misses: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct AssignRunManifest {
    pub(super) manifest_version: u32,
    pub(super) run_id: String,
    pub(super) generated_at: String,
    pub(super) units_path: String,
    pub(super) units_sha256: String,
    pub(super) catalog_path: String,
    pub(super) catalog_sha256: String,
    pub(super) seed_assignments_path: Option<String>,
    pub(super) seeded_claims: usize,
    pub(super) output_path: String,
    pub(super) model_id: String,
    pub(super) model_name: String,
    pub(super) embedding_dim: usize,
    pub(super) config: MatchConfig,
    pub(super) max_candidates: usize,
    pub(super) full_pool: bool,
    pub(super) catalog_candidates: usize,
    pub(super) embedding_cache: Option<CacheStats>,
    pub(super) summary: MatchSummary,
    pub(super) rows_written: usize,
    /// Rows per outcome (`matched`, `no_match`, `failed`) in the written table.
    pub(super) outcome_counts: BTreeMap<String, usize>,
    pub(super) cross_unit_duplicates: usize,
    pub(super) posthoc: Option<PosthocReport>,
    pub(super) duration_ms: u128,
    pub(super) status: String,
    pub(super) warnings: Vec<String>,
}
