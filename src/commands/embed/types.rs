use serde::Serialize;

pub(super) const EMBEDDING_DB_SCHEMA_VERSION: &str = "0.1.0";
pub(super) const SEMANTIC_MODEL_CONFIG_LOCK_PATH: &str =
    "manifests/semantic_model_config.lock.json";

#[derive(Debug, Clone)]
pub(super) struct PendingEmbedding {
    pub(super) candidate_id: String,
    pub(super) text_hash: String,
    pub(super) descriptor: String,
}

#[derive(Debug, Serialize)]
pub(super) struct EmbeddingRunManifest {
    pub(super) manifest_version: u32,
    pub(super) run_id: String,
    pub(super) generated_at: String,
    pub(super) catalog_path: String,
    pub(super) catalog_sha256: String,
    pub(super) model_id: String,
    pub(super) model_name: String,
    pub(super) embedding_dim: usize,
    pub(super) normalization: String,
    pub(super) backend: String,
    pub(super) db_schema_version: String,
    pub(super) refresh_mode: String,
    pub(super) catalog_candidates: usize,
    pub(super) eligible_candidates: usize,
    pub(super) updated_candidates: usize,
    pub(super) skipped_empty_candidates: usize,
    pub(super) skipped_duplicate_candidates: usize,
    pub(super) stale_candidates_before: usize,
    pub(super) batch_size: usize,
    pub(super) duration_ms: u128,
    pub(super) status: String,
    pub(super) warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SemanticModelConfigLock {
    pub(super) manifest_version: u32,
    pub(super) model_id: String,
    pub(super) model_name: String,
    pub(super) embedding_dim: usize,
    pub(super) normalization: String,
    pub(super) runtime_backend: String,
    pub(super) created_at: String,
    pub(super) checksum: String,
}
