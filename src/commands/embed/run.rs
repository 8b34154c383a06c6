use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::store::{
    ensure_embedding_schema, ensure_model_entry, is_candidate_current, open_cache_connection,
    upsert_candidate_embedding, upsert_text_embedding,
};
use super::types::{
    EMBEDDING_DB_SCHEMA_VERSION, EmbeddingRunManifest, PendingEmbedding,
    SEMANTIC_MODEL_CONFIG_LOCK_PATH, SemanticModelConfigLock,
};
use crate::cli::{EmbedArgs, EmbedRefreshMode};
use crate::commands::assign::load_catalog;
use crate::matching::{Embedder, LocalEmbedder};
use crate::model::Candidate;
use crate::semantic::{SemanticModelConfig, embedding_text_hash, resolve_model_config};
use crate::util::{
    now_utc_string, run_stamp, sha256_file, stamped_manifest_path, write_json_pretty,
};

pub(super) const DEFAULT_DB_FILE: &str = "figmatch_index.sqlite";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct EmbedCounts {
    pub(super) eligible: usize,
    pub(super) updated: usize,
    pub(super) skipped_empty: usize,
    pub(super) skipped_duplicate: usize,
    pub(super) stale_before: usize,
}

pub fn run(args: EmbedArgs) -> Result<()> {
    let batch_size = args.batch_size.max(1);
    let model = resolve_model_config(&args.model_id);

    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let semantic_model_lock_path = args
        .semantic_model_lock_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(SEMANTIC_MODEL_CONFIG_LOCK_PATH));

    let candidates = load_catalog(&args.catalog)?;
    let catalog_sha256 = sha256_file(&args.catalog)?;

    let mut connection = open_cache_connection(&db_path)?;
    ensure_embedding_schema(&connection)?;
    ensure_model_entry(&connection, &model)?;
    write_semantic_model_config_lockfile(&model, &semantic_model_lock_path)?;

    let started_at = now_utc_string();
    let started = Instant::now();
    let stamp = run_stamp();
    let run_id = format!("embed-{stamp}");

    let embedder = LocalEmbedder::new(model.dimensions);
    let counts = embed_catalog(
        &mut connection,
        &embedder,
        &model,
        &candidates,
        args.refresh_mode,
        batch_size,
    )?;

    let mut warnings = Vec::<String>::new();
    if counts.eligible == 0 {
        warnings.push("catalog has no candidates with descriptor text".to_string());
    }
    if counts.skipped_duplicate > 0 {
        warnings.push(format!(
            "{} duplicate candidate identifiers ignored",
            counts.skipped_duplicate
        ));
    }

    let manifest = EmbeddingRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        catalog_path: args.catalog.display().to_string(),
        catalog_sha256,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        normalization: model.normalization.clone(),
        backend: model.backend.clone(),
        db_schema_version: EMBEDDING_DB_SCHEMA_VERSION.to_string(),
        refresh_mode: args.refresh_mode.as_str().to_string(),
        catalog_candidates: candidates.len(),
        eligible_candidates: counts.eligible,
        updated_candidates: counts.updated,
        skipped_empty_candidates: counts.skipped_empty,
        skipped_duplicate_candidates: counts.skipped_duplicate,
        stale_candidates_before: counts.stale_before,
        batch_size,
        duration_ms: started.elapsed().as_millis(),
        status: "completed".to_string(),
        warnings,
    };

    let manifest_path = stamped_manifest_path(&args.cache_root, "embedding_run", &stamp)?;
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        model_id = %model.model_id,
        eligible_candidates = counts.eligible,
        updated_candidates = counts.updated,
        "embedding refresh completed"
    );

    Ok(())
}

/// Embeds every eligible catalog candidate into the cache, committing one
/// transaction per batch.
pub(super) fn embed_catalog<E: Embedder>(
    connection: &mut Connection,
    embedder: &E,
    model: &SemanticModelConfig,
    candidates: &[Candidate],
    refresh_mode: EmbedRefreshMode,
    batch_size: usize,
) -> Result<EmbedCounts> {
    let batch_size = batch_size.max(1);
    let mut counts = EmbedCounts::default();
    let mut seen = HashSet::<&str>::new();
    let mut pending = Vec::<PendingEmbedding>::new();

    for candidate in candidates {
        if !seen.insert(candidate.candidate_id.as_str()) {
            warn!(candidate_id = %candidate.candidate_id, "duplicate candidate identifier skipped");
            counts.skipped_duplicate += 1;
            continue;
        }
        if candidate.candidate_id.is_empty() || candidate.descriptor_text.is_empty() {
            counts.skipped_empty += 1;
            continue;
        }

        counts.eligible += 1;

        let text_hash = embedding_text_hash(&candidate.descriptor_text);
        let current = is_candidate_current(
            connection,
            &candidate.candidate_id,
            &model.model_id,
            &text_hash,
            model.dimensions,
        )?;
        if !current {
            counts.stale_before += 1;
        }

        let should_update = match refresh_mode {
            EmbedRefreshMode::Full => true,
            EmbedRefreshMode::Missing => !current,
        };
        if !should_update {
            continue;
        }

        pending.push(PendingEmbedding {
            candidate_id: candidate.candidate_id.clone(),
            text_hash,
            descriptor: candidate.descriptor_text.clone(),
        });

        if pending.len() >= batch_size {
            counts.updated += flush_embed_batch(connection, embedder, model, &mut pending)?;
            info!(
                model_id = %model.model_id,
                updated_candidates = counts.updated,
                eligible_candidates = counts.eligible,
                "embed batch committed"
            );
        }
    }

    counts.updated += flush_embed_batch(connection, embedder, model, &mut pending)?;

    Ok(counts)
}

fn flush_embed_batch<E: Embedder>(
    connection: &mut Connection,
    embedder: &E,
    model: &SemanticModelConfig,
    pending: &mut Vec<PendingEmbedding>,
) -> Result<usize> {
    if pending.is_empty() {
        return Ok(0);
    }

    let texts = pending
        .iter()
        .map(|item| item.descriptor.clone())
        .collect::<Vec<String>>();
    let vectors = embedder
        .embed_batch(&texts)
        .context("failed to embed candidate batch")?;
    if vectors.len() != texts.len() {
        bail!(
            "embedder returned {} vectors for {} candidates",
            vectors.len(),
            texts.len()
        );
    }

    let tx = connection.transaction()?;
    let mut updated = 0usize;
    for (item, vector) in pending.drain(..).zip(vectors) {
        upsert_text_embedding(&tx, &item.text_hash, &model.model_id, &vector)?;
        upsert_candidate_embedding(&tx, &item.candidate_id, &model.model_id, &item.text_hash)?;
        updated += 1;
    }
    tx.commit()?;

    Ok(updated)
}

fn write_semantic_model_config_lockfile(
    model: &SemanticModelConfig,
    lock_path: &Path,
) -> Result<()> {
    let checksum_input = format!(
        "{}|{}|{}|{}|{}",
        model.model_id, model.model_name, model.dimensions, model.normalization, model.backend
    );
    let mut hasher = Sha256::new();
    hasher.update(checksum_input.as_bytes());
    let checksum = format!("{:x}", hasher.finalize());

    let lock = SemanticModelConfigLock {
        manifest_version: 1,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        normalization: model.normalization.clone(),
        runtime_backend: model.backend.clone(),
        created_at: now_utc_string(),
        checksum,
    };

    write_json_pretty(lock_path, &lock)
}

pub(crate) fn resolve_db_path(cache_root: &Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| cache_root.join(DEFAULT_DB_FILE))
}
