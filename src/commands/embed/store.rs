use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::semantic::{SemanticModelConfig, decode_embedding_blob, encode_embedding_blob};
use crate::util::{ensure_directory, now_utc_string};

pub(crate) fn open_cache_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let connection = Connection::open(db_path).with_context(|| {
        format!(
            "failed to open embedding cache database: {}",
            db_path.display()
        )
    })?;

    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL for embedding cache")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL for embedding cache")?;

    Ok(connection)
}

pub(crate) fn ensure_embedding_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embedding_models (
              model_id TEXT PRIMARY KEY,
              backend TEXT NOT NULL,
              model_name TEXT NOT NULL,
              dimensions INTEGER NOT NULL,
              normalize INTEGER NOT NULL DEFAULT 1,
              created_at TEXT NOT NULL,
              config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS text_embeddings (
              text_hash TEXT NOT NULL,
              model_id TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              generated_at TEXT NOT NULL,
              PRIMARY KEY(text_hash, model_id),
              FOREIGN KEY(model_id) REFERENCES embedding_models(model_id)
            );

            CREATE TABLE IF NOT EXISTS candidate_embeddings (
              candidate_id TEXT NOT NULL,
              model_id TEXT NOT NULL,
              text_hash TEXT NOT NULL,
              generated_at TEXT NOT NULL,
              PRIMARY KEY(candidate_id, model_id),
              FOREIGN KEY(model_id) REFERENCES embedding_models(model_id)
            );
            ",
        )
        .context("failed to create embedding cache schema")
}

pub(crate) fn ensure_model_entry(connection: &Connection, model: &SemanticModelConfig) -> Result<()> {
    let config_json = serde_json::json!({
        "model_id": model.model_id,
        "model_name": model.model_name,
        "dimensions": model.dimensions,
        "normalization": model.normalization,
        "backend": model.backend,
    })
    .to_string();

    connection.execute(
        "
        INSERT INTO embedding_models(model_id, backend, model_name, dimensions, normalize, created_at, config_json)
        VALUES(?1, ?2, ?3, ?4, 1, ?5, ?6)
        ON CONFLICT(model_id) DO UPDATE SET
          backend=excluded.backend,
          model_name=excluded.model_name,
          dimensions=excluded.dimensions,
          normalize=excluded.normalize,
          config_json=excluded.config_json
        ",
        params![
            model.model_id,
            model.backend,
            model.model_name,
            model.dimensions as i64,
            now_utc_string(),
            config_json,
        ],
    )?;

    Ok(())
}

pub(crate) fn load_cached_embedding(
    connection: &Connection,
    text_hash: &str,
    model_id: &str,
    expected_dim: usize,
) -> Result<Option<Vec<f32>>> {
    let blob = connection
        .query_row(
            "
            SELECT embedding
            FROM text_embeddings
            WHERE text_hash = ?1 AND model_id = ?2 AND embedding_dim = ?3
            LIMIT 1
            ",
            params![text_hash, model_id, expected_dim as i64],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .with_context(|| format!("failed to read cached embedding {text_hash}"))?;

    Ok(blob.and_then(|blob| decode_embedding_blob(&blob, expected_dim)))
}

pub(crate) fn upsert_text_embedding(
    connection: &Connection,
    text_hash: &str,
    model_id: &str,
    embedding: &[f32],
) -> Result<()> {
    connection.execute(
        "
        INSERT INTO text_embeddings(text_hash, model_id, embedding, embedding_dim, generated_at)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(text_hash, model_id) DO UPDATE SET
          embedding=excluded.embedding,
          embedding_dim=excluded.embedding_dim,
          generated_at=excluded.generated_at
        ",
        params![
            text_hash,
            model_id,
            encode_embedding_blob(embedding),
            embedding.len() as i64,
            now_utc_string(),
        ],
    )?;

    Ok(())
}

pub(super) fn upsert_candidate_embedding(
    connection: &Connection,
    candidate_id: &str,
    model_id: &str,
    text_hash: &str,
) -> Result<()> {
    connection.execute(
        "
        INSERT INTO candidate_embeddings(candidate_id, model_id, text_hash, generated_at)
        VALUES(?1, ?2, ?3, ?4)
        ON CONFLICT(candidate_id, model_id) DO UPDATE SET
          text_hash=excluded.text_hash,
          generated_at=excluded.generated_at
        ",
        params![candidate_id, model_id, text_hash, now_utc_string()],
    )?;

    Ok(())
}

/// A candidate is current when its recorded text hash matches and the vector is cached.
pub(super) fn is_candidate_current(
    connection: &Connection,
    candidate_id: &str,
    model_id: &str,
    text_hash: &str,
    expected_dim: usize,
) -> Result<bool> {
    let recorded = connection
        .query_row(
            "
            SELECT text_hash
            FROM candidate_embeddings
            WHERE candidate_id = ?1 AND model_id = ?2
            LIMIT 1
            ",
            params![candidate_id, model_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    if recorded.as_deref() != Some(text_hash) {
        return Ok(false);
    }

    Ok(load_cached_embedding(connection, text_hash, model_id, expected_dim)?.is_some())
}
