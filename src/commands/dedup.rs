use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::cli::DedupArgs;
use crate::matching::posthoc::PosthocOutcome;
use crate::matching::{PosthocConfig, PosthocReport, apply_posthoc_filter};
use crate::model::Assignment;
use crate::util::{
    now_utc_string, read_json, run_stamp, sha256_file, stamped_manifest_path, write_json_pretty,
};

#[derive(Debug, Serialize)]
struct DedupRunManifest {
    manifest_version: u32,
    run_id: String,
    generated_at: String,
    input_path: String,
    input_sha256: String,
    output_path: String,
    removed_path: String,
    config: PosthocConfig,
    report: PosthocReport,
    duration_ms: u128,
    status: String,
}

pub fn run(args: DedupArgs) -> Result<()> {
    let config = PosthocConfig {
        rank_threshold: args.rank_threshold,
        dedup: !args.no_dedup,
    };
    config.validate()?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    let removed_path = removed_rows_path(&output_path);

    let started_at = now_utc_string();
    let started = Instant::now();
    let stamp = run_stamp();
    let run_id = format!("dedup-{stamp}");

    let rows = read_json::<Vec<Assignment>>(&args.input)?;
    info!(path = %args.input.display(), rows = rows.len(), "assignment table loaded");

    let PosthocOutcome {
        rows,
        low_rank,
        report,
    } = apply_posthoc_filter(rows, &config);
    write_json_pretty(&output_path, &rows)?;
    write_json_pretty(&removed_path, &low_rank)?;
    info!(path = %removed_path.display(), rows = low_rank.len(), "low-rank rows written");

    let manifest = DedupRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        input_path: args.input.display().to_string(),
        input_sha256: sha256_file(&args.input)?,
        output_path: output_path.display().to_string(),
        removed_path: removed_path.display().to_string(),
        config,
        report,
        duration_ms: started.elapsed().as_millis(),
        status: "completed".to_string(),
    };

    let manifest_path = stamped_manifest_path(&args.cache_root, "dedup_run", &stamp)?;
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        output = %output_path.display(),
        manifest = %manifest_path.display(),
        rows_out = manifest.report.rows_out,
        "post-hoc dedup completed"
    );

    Ok(())
}

/// `table.json` becomes `table_dedup.json` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assignments".to_string());
    input.with_file_name(format!("{stem}_dedup.json"))
}

/// Rows cut by the rank filter land next to the output: `table_dedup.json`
/// pairs with `table_dedup_removed.json`.
fn removed_rows_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assignments".to_string());
    output.with_file_name(format!("{stem}_removed.json"))
}
