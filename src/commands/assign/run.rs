use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Result, bail};
use tracing::{info, warn};

use super::catalog::{CatalogSource, load_catalog};
use super::embedder::StoreEmbedder;
use super::types::{AssignRunManifest, CacheStats};
use crate::cli::AssignArgs;
use crate::commands::embed::{
    ensure_embedding_schema, ensure_model_entry, open_cache_connection, resolve_db_path,
};
use crate::matching::posthoc::PosthocOutcome;
use crate::matching::{
    DedupLedger, Embedder, LocalEmbedder, MatchConfig, MatchOutcome, Matcher, PosthocConfig,
    apply_posthoc_filter, cross_unit_duplicates,
};
use crate::model::{Assignment, TextUnit};
use crate::semantic::resolve_model_config;
use crate::util::{
    now_utc_string, read_json, run_stamp, sha256_file, stamped_manifest_path, write_json_pretty,
};

pub fn run(args: AssignArgs) -> Result<()> {
    let config = MatchConfig {
        min_score: args.min_score,
        top_k: args.top_k,
        dedup_margin: args.dedup_margin,
        dedup_policy: args.dedup_policy.into(),
        lexical_weight: args.lexical_weight,
        max_query_terms: args.max_query_terms,
    };
    config.validate()?;

    let posthoc_config = args.posthoc.then(|| PosthocConfig {
        rank_threshold: args.rank_threshold,
        dedup: true,
    });
    if let Some(posthoc_config) = &posthoc_config {
        posthoc_config.validate()?;
    }

    let model = resolve_model_config(&args.model_id);
    let stamp = run_stamp();
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.cache_root, &stamp));

    let units = load_units(&args.units)?;
    if units.is_empty() {
        warn!(path = %args.units.display(), "unit list is empty");
    }
    let candidates = load_catalog(&args.catalog)?;
    let source = CatalogSource::new(candidates, args.max_candidates, args.full_pool);

    let mut warnings = Vec::<String>::new();
    if source.is_empty() {
        warn!(path = %args.catalog.display(), "catalog is empty");
        warnings.push("catalog has no usable candidates".to_string());
    }

    let ledger = match &args.seed_assignments {
        Some(path) => {
            let rows = read_json::<Vec<Assignment>>(path)?;
            let ledger = DedupLedger::from_assignments(&rows);
            if ledger.is_empty() {
                warn!(path = %path.display(), "seed table holds no claims");
            } else {
                info!(path = %path.display(), claims = ledger.len(), "ledger seeded");
            }
            ledger
        }
        None => DedupLedger::new(),
    };
    let seeded_claims = ledger.len();

    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("assign-{stamp}");

    info!(
        run_id = %run_id,
        units = units.len(),
        catalog_candidates = source.len(),
        dedup_policy = config.dedup_policy.as_str(),
        "assignment run started"
    );

    let (outcome, embedding_cache) = if args.no_embedding_cache {
        let embedder = LocalEmbedder::new(model.dimensions);
        let outcome = match_units(config.clone(), &source, embedder, ledger, &units)?;
        (outcome, None)
    } else {
        let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
        let connection = open_cache_connection(&db_path)?;
        ensure_embedding_schema(&connection)?;
        ensure_model_entry(&connection, &model)?;

        let embedder = StoreEmbedder::new(&connection, model.clone());
        let outcome = match_units(config.clone(), &source, &embedder, ledger, &units)?;
        let stats = CacheStats {
            hits: embedder.hits(),
            misses: embedder.misses(),
        };
        info!(hits = stats.hits, misses = stats.misses, "embedding cache usage");
        (outcome, Some(stats))
    };

    let MatchOutcome {
        assignments,
        summary,
    } = outcome;
    for failure in &summary.failures {
        warnings.push(format!("unit {} failed: {}", failure.unit_id, failure.reason));
    }

    let (rows, posthoc) = match &posthoc_config {
        Some(posthoc_config) => {
            let PosthocOutcome { rows, report, .. } =
                apply_posthoc_filter(assignments, posthoc_config);
            (rows, Some(report))
        }
        None => (assignments, None),
    };

    let duplicates = cross_unit_duplicates(&rows);
    if !duplicates.is_empty() {
        info!(
            candidates = duplicates.len(),
            "candidates assigned to more than one unit"
        );
    }

    write_json_pretty(&output_path, &rows)?;

    let mut outcome_counts = BTreeMap::<String, usize>::new();
    for row in &rows {
        *outcome_counts
            .entry(row.outcome.as_str().to_string())
            .or_default() += 1;
    }

    let manifest = AssignRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        units_path: args.units.display().to_string(),
        units_sha256: sha256_file(&args.units)?,
        catalog_path: args.catalog.display().to_string(),
        catalog_sha256: sha256_file(&args.catalog)?,
        seed_assignments_path: args
            .seed_assignments
            .as_ref()
            .map(|path| path.display().to_string()),
        seeded_claims,
        output_path: output_path.display().to_string(),
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        config,
        max_candidates: args.max_candidates,
        full_pool: args.full_pool,
        catalog_candidates: source.len(),
        embedding_cache,
        summary,
        rows_written: rows.len(),
        outcome_counts,
        cross_unit_duplicates: duplicates.len(),
        posthoc,
        duration_ms: started.elapsed().as_millis(),
        status: "completed".to_string(),
        warnings,
    };

    let manifest_path = stamped_manifest_path(&args.cache_root, "assign_run", &stamp)?;
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        output = %output_path.display(),
        manifest = %manifest_path.display(),
        rows = manifest.rows_written,
        "assignment run completed"
    );

    Ok(())
}

fn match_units<E: Embedder>(
    config: MatchConfig,
    source: &CatalogSource,
    embedder: E,
    ledger: DedupLedger,
    units: &[TextUnit],
) -> Result<MatchOutcome> {
    let mut matcher = Matcher::new(config, source, embedder)?.with_ledger(ledger);
    let outcome = matcher.run(units);
    info!(claims = matcher.ledger().len(), "ledger state after run");
    Ok(outcome)
}

/// Reads the ordered unit list; identifiers must be present and unique.
pub(super) fn load_units(path: &Path) -> Result<Vec<TextUnit>> {
    let units = read_json::<Vec<TextUnit>>(path)?;

    let mut seen = HashSet::<&str>::new();
    for (index, unit) in units.iter().enumerate() {
        let unit_id = unit.unit_id.trim();
        if unit_id.is_empty() {
            bail!("unit at position {index} in {} has no unit_id", path.display());
        }
        if !seen.insert(unit_id) {
            bail!("duplicate unit_id {unit_id} in {}", path.display());
        }
    }

    Ok(units)
}

pub(super) fn default_output_path(cache_root: &Path, stamp: &str) -> PathBuf {
    cache_root
        .join("outputs")
        .join(format!("assignments_{stamp}.json"))
}
