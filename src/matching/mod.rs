//! Semantic matching of text units to candidate media items.
//!
//! Data flows one way: a unit's pool is retrieved, scored against the unit
//! text, shortlisted, then arbitrated against the run-wide [`DedupLedger`]
//! before the accepted candidates become ranked [`Assignment`](crate::model::Assignment)
//! rows. [`posthoc`] cleans up tables produced without a shared ledger.

pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod posthoc;
pub mod query;
pub mod scorer;
pub mod selector;


pub use config::{DedupPolicy, MatchConfig, PosthocConfig};
pub use ledger::DedupLedger;
pub use orchestrator::{CandidateSource, MatchOutcome, MatchSummary, Matcher};
pub use posthoc::{PosthocReport, apply_posthoc_filter, cross_unit_duplicates};
pub use scorer::{Embedder, LocalEmbedder};
