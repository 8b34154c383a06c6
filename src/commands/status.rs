use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::embed::resolve_db_path;
use crate::util::read_json;

const MANIFEST_KINDS: &[&str] = &["embedding_run_", "assign_run_", "dedup_run_"];

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = resolve_db_path(&args.cache_root, None);

    info!(cache_root = %args.cache_root.display(), "status requested");

    for prefix in MANIFEST_KINDS {
        let Some(path) = latest_manifest(&manifest_dir, prefix)? else {
            warn!(kind = prefix.trim_end_matches('_'), "no manifest found");
            continue;
        };

        let manifest = read_json::<Value>(&path)?;
        info!(
            kind = prefix.trim_end_matches('_'),
            path = %path.display(),
            run_id = %field(&manifest, "run_id"),
            generated_at = %field(&manifest, "generated_at"),
            status = %field(&manifest, "status"),
            "latest manifest"
        );
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let models = query_count(&conn, "SELECT COUNT(*) FROM embedding_models").unwrap_or(0);
        let vectors = query_count(&conn, "SELECT COUNT(*) FROM text_embeddings").unwrap_or(0);
        let candidates =
            query_count(&conn, "SELECT COUNT(*) FROM candidate_embeddings").unwrap_or(0);

        info!(
            path = %db_path.display(),
            models,
            vectors,
            candidates,
            "embedding cache status"
        );
    } else {
        warn!(path = %db_path.display(), "embedding cache missing");
    }

    Ok(())
}

/// Manifest names end in a compact UTC timestamp, so the greatest name is the newest.
fn latest_manifest(manifest_dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut latest = None::<(String, PathBuf)>;
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to list {}", manifest_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(".json") {
            continue;
        }
        if latest
            .as_ref()
            .is_none_or(|(current, _)| current.as_str() < name)
        {
            latest = Some((name.to_string(), path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

fn field(manifest: &Value, key: &str) -> String {
    match manifest.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
