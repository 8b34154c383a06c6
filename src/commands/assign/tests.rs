use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde_json::json;

use super::catalog::{CatalogSource, load_catalog};
use super::embedder::StoreEmbedder;
use super::run::{load_units, run};
use crate::cli::{AssignArgs, DedupMode};
use crate::commands::embed::{ensure_embedding_schema, ensure_model_entry};
use crate::matching::{CandidateSource, Embedder, LocalEmbedder};
use crate::model::{Assignment, AssignmentOutcome, Candidate};
use crate::semantic::resolve_model_config;

fn write_file(path: &Path, value: &serde_json::Value) {
    fs::write(path, serde_json::to_vec_pretty(value).expect("json")).expect("write fixture");
}

fn ids(candidates: &[Candidate]) -> Vec<&str> {
    candidates
        .iter()
        .map(|candidate| candidate.candidate_id.as_str())
        .collect()
}

fn pool() -> Vec<Candidate> {
    vec![
        Candidate::new("c", "Red fox resting"),
        Candidate::new("a", "Red fox hunting in snow"),
        Candidate::new("b", "Snow covered fox den"),
        Candidate::new("d", "Lighthouse at dusk"),
        Candidate::new("a", "Shadowed duplicate record"),
        Candidate::new("", "Anonymous record"),
    ]
}

#[test]
fn catalog_retrieval_ranks_by_term_overlap_then_id() {
    let source = CatalogSource::new(pool(), 20, false);
    assert_eq!(source.len(), 4);

    let hits = source.retrieve("red fox snow").expect("retrieve");
    assert_eq!(ids(&hits), vec!["a", "b", "c"]);
    assert_eq!(hits[0].descriptor_text, "Red fox hunting in snow");
}

#[test]
fn catalog_retrieval_respects_cap_and_full_pool() {
    let capped = CatalogSource::new(pool(), 2, false);
    assert_eq!(
        ids(&capped.retrieve("red fox snow").expect("retrieve")),
        vec!["a", "b"]
    );
    assert!(capped.retrieve("of to").expect("retrieve").is_empty());

    let full = CatalogSource::new(pool(), 2, true);
    assert_eq!(
        ids(&full.retrieve("anything").expect("retrieve")),
        vec!["c", "a", "b", "d"]
    );
}

#[test]
fn load_catalog_builds_descriptors_from_raw_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    write_file(
        &path,
        &json!([
            {"identifier": "img-1", "title": "Red fox", "description": "in  snow", "credit": "NPS"},
            {"identifier": "img-2", "title": "Lighthouse"}
        ]),
    );

    let catalog = load_catalog(&path).expect("catalog");
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[0].descriptor_text, "Red fox in snow NPS");
    assert_eq!(catalog[0].metadata.get("credit").map(String::as_str), Some("NPS"));
}

#[test]
fn load_units_rejects_duplicate_identifiers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("units.json");
    write_file(
        &path,
        &json!([
            {"unit_id": "1.1", "content": "first"},
            {"unit_id": "1.1", "content": "second"}
        ]),
    );

    let err = load_units(&path).expect_err("duplicates must fail");
    assert!(err.to_string().contains("duplicate unit_id 1.1"));
}

#[test]
fn store_embedder_reads_through_the_cache() {
    let model = resolve_model_config("");
    let connection = Connection::open_in_memory().expect("db");
    ensure_embedding_schema(&connection).expect("schema");
    ensure_model_entry(&connection, &model).expect("model");

    let texts = vec!["Red fox in snow".to_string(), "Lighthouse".to_string()];
    let embedder = StoreEmbedder::new(&connection, model.clone());

    let first = embedder.embed_batch(&texts).expect("first batch");
    assert_eq!((embedder.hits(), embedder.misses()), (0, 2));

    let second = embedder.embed_batch(&texts).expect("second batch");
    assert_eq!((embedder.hits(), embedder.misses()), (2, 2));
    assert_eq!(first, second);

    let direct = LocalEmbedder::new(model.dimensions)
        .embed_batch(&texts)
        .expect("local batch");
    assert_eq!(first, direct);
}

fn assign_args(root: &Path) -> AssignArgs {
    AssignArgs {
        cache_root: root.join("cache"),
        db_path: None,
        units: root.join("units.json"),
        catalog: root.join("catalog.json"),
        output: Some(root.join("assignments.json")),
        model_id: String::new(),
        min_score: 0.5,
        top_k: 1,
        dedup_margin: 0.05,
        dedup_policy: DedupMode::Strict,
        lexical_weight: 0.0,
        max_query_terms: 6,
        max_candidates: 20,
        full_pool: false,
        no_embedding_cache: false,
        seed_assignments: None,
        posthoc: false,
        rank_threshold: 5,
    }
}

fn write_fixtures(root: &Path) {
    write_file(
        &root.join("units.json"),
        &json!([
            {"unit_id": "2.1", "content": "Red fox hunting in fresh snow"},
            {"unit_id": "2.2", "content": "Red fox hunting in fresh snow"}
        ]),
    );
    write_file(
        &root.join("catalog.json"),
        &json!([
            {"identifier": "fox", "title": "Red fox hunting in fresh snow"},
            {"identifier": "lamp", "title": "Lighthouse at dusk"}
        ]),
    );
}

#[test]
fn assign_run_writes_table_and_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixtures(dir.path());
    let args = assign_args(dir.path());

    run(args.clone()).expect("assign run");

    let rows: Vec<Assignment> =
        serde_json::from_slice(&fs::read(dir.path().join("assignments.json")).expect("output"))
            .expect("parse output");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].unit_id, "2.1");
    assert_eq!(rows[0].candidate_id.as_deref(), Some("fox"));
    assert_eq!(rows[0].rank, Some(1));
    assert!(rows[0].score.is_some_and(|score| score > 0.99));
    assert_eq!(rows[1].unit_id, "2.2");
    assert_eq!(rows[1].outcome, AssignmentOutcome::NoMatch);

    let manifests = fs::read_dir(args.cache_root.join("manifests"))
        .expect("manifest dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("assign_run_"))
        .count();
    assert_eq!(manifests, 1);
    assert!(args.cache_root.join("figmatch_index.sqlite").exists());
}

fn latest_manifest(cache_root: &Path, prefix: &str) -> serde_json::Value {
    let path = fs::read_dir(cache_root.join("manifests"))
        .expect("manifest dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
        })
        .max()
        .expect("manifest written");
    serde_json::from_slice(&fs::read(path).expect("manifest")).expect("parse manifest")
}

#[test]
fn assign_with_posthoc_keeps_a_row_for_every_unit_after_a_reclaim() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        &dir.path().join("units.json"),
        &json!([
            {"unit_id": "3.1", "content": "Red fox hunting"},
            {"unit_id": "3.2", "content": "Red fox hunting in fresh snow"},
            {"unit_id": "3.3", "content": "Lighthouse at dusk"}
        ]),
    );
    write_file(
        &dir.path().join("catalog.json"),
        &json!([
            {"identifier": "fox", "title": "Red fox hunting in fresh snow"},
            {"identifier": "lamp", "title": "Lighthouse at dusk"}
        ]),
    );

    let mut args = assign_args(dir.path());
    args.dedup_policy = DedupMode::Margin;
    args.posthoc = true;
    run(args.clone()).expect("assign run");

    let rows: Vec<Assignment> =
        serde_json::from_slice(&fs::read(dir.path().join("assignments.json")).expect("output"))
            .expect("parse output");
    let units = rows.iter().map(|row| row.unit_id.as_str()).collect::<Vec<_>>();
    assert_eq!(units, vec!["3.1", "3.2", "3.3"]);
    assert_eq!(rows[0].outcome, AssignmentOutcome::NoMatch);
    assert_eq!(rows[0].specificity, 2);
    assert_eq!(rows[1].candidate_id.as_deref(), Some("fox"));
    assert_eq!(rows[2].candidate_id.as_deref(), Some("lamp"));

    let manifest = latest_manifest(&args.cache_root, "assign_run_");
    assert_eq!(manifest["summary"]["reclaimed_candidates"], 1);
    assert_eq!(manifest["posthoc"]["rank_threshold"], 5);
    assert_eq!(manifest["posthoc"]["removed_by_rank"], 0);
    assert_eq!(manifest["posthoc"]["removed_by_dedup"], 1);
    assert_eq!(manifest["posthoc"]["emptied_units"], json!(["3.1"]));
    assert_eq!(manifest["rows_written"], 3);
    assert_eq!(manifest["outcome_counts"], json!({"matched": 2, "no_match": 1}));
    assert!(
        manifest["run_id"]
            .as_str()
            .is_some_and(|run_id| run_id.starts_with("assign-"))
    );
}

#[test]
fn posthoc_rank_threshold_is_validated_before_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut args = assign_args(dir.path());
    args.posthoc = true;
    args.rank_threshold = 0;

    let err = run(args).expect_err("rank_threshold 0 must fail");
    assert!(err.to_string().contains("rank_threshold"));
}

#[test]
fn seeded_ledger_blocks_previously_claimed_candidates() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixtures(dir.path());
    let seed = dir.path().join("seed.json");
    write_file(
        &seed,
        &json!([
            {"unit_id": "1.9", "outcome": "matched", "candidate_id": "fox", "rank": 1, "score": 1.0}
        ]),
    );

    let mut args = assign_args(dir.path());
    args.seed_assignments = Some(seed);
    args.no_embedding_cache = true;
    run(args.clone()).expect("assign run");

    let rows: Vec<Assignment> =
        serde_json::from_slice(&fs::read(dir.path().join("assignments.json")).expect("output"))
            .expect("parse output");
    assert!(rows.iter().all(Assignment::is_sentinel));
    assert!(!args.cache_root.join("figmatch_index.sqlite").exists());
}

#[test]
fn invalid_configuration_fails_before_reading_inputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut args = assign_args(dir.path());
    args.top_k = 0;

    let err = run(args).expect_err("top_k 0 must fail");
    assert!(err.to_string().contains("top_k"));
}
