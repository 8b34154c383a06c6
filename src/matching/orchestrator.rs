use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::{DedupPolicy, MatchConfig};
use super::error::MatchError;
use super::ledger::{ClaimDecision, DedupLedger};
use super::query::QueryBuilder;
use super::scorer::{Embedder, SimilarityScorer};
use super::selector::{rank_admissible, select};
use crate::model::{Assignment, AssignmentOutcome, Candidate, ScoredCandidate, TextUnit};

/// Candidate retrieval collaborator: the raw pool for one query string.
pub trait CandidateSource {
    fn retrieve(&self, query: &str) -> Result<Vec<Candidate>>;
}

impl<S: CandidateSource + ?Sized> CandidateSource for &S {
    fn retrieve(&self, query: &str) -> Result<Vec<Candidate>> {
        (**self).retrieve(query)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSummary {
    pub units_total: usize,
    pub units_matched: usize,
    pub units_no_match: usize,
    pub units_failed: usize,
    pub assignments: usize,
    pub unique_candidates: usize,
    pub ledger_rejections: usize,
    pub reclaimed_candidates: usize,
    pub failures: Vec<UnitFailure>,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub assignments: Vec<Assignment>,
    pub summary: MatchSummary,
}

struct UnitMatch {
    query: String,
    candidate_count: usize,
    accepted: Vec<ScoredCandidate>,
}

/// Sequential, forward-greedy matcher over text units.
///
/// Units are processed strictly in input order; that order decides which unit
/// claims a contested candidate first. Earlier claims are never revoked.
pub struct Matcher<S, E> {
    config: MatchConfig,
    source: S,
    scorer: SimilarityScorer<E>,
    queries: QueryBuilder,
    ledger: DedupLedger,
}

impl<S: CandidateSource, E: Embedder> Matcher<S, E> {
    pub fn new(config: MatchConfig, source: S, embedder: E) -> Result<Self> {
        config.validate()?;
        let queries = QueryBuilder::new(config.max_query_terms)?;
        let scorer = SimilarityScorer::new(embedder, config.lexical_weight);

        Ok(Self {
            config,
            source,
            scorer,
            queries,
            ledger: DedupLedger::new(),
        })
    }

    /// Starts from existing claims instead of an empty ledger.
    pub fn with_ledger(mut self, ledger: DedupLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn run(&mut self, units: &[TextUnit]) -> MatchOutcome {
        let mut assignments = Vec::<Assignment>::new();
        let mut summary = MatchSummary {
            units_total: units.len(),
            ..MatchSummary::default()
        };

        for unit in units {
            match self.match_unit(unit, &mut summary) {
                Ok(matched) if matched.accepted.is_empty() => {
                    debug!(
                        unit_id = %unit.unit_id,
                        candidate_count = matched.candidate_count,
                        "no acceptable candidate"
                    );
                    summary.units_no_match += 1;
                    assignments.push(Assignment::sentinel(
                        unit,
                        AssignmentOutcome::NoMatch,
                        &matched.query,
                        matched.candidate_count,
                    ));
                }
                Ok(matched) => {
                    summary.units_matched += 1;
                    for (index, entry) in matched.accepted.iter().enumerate() {
                        assignments.push(Assignment::matched(
                            unit,
                            entry,
                            index + 1,
                            &matched.query,
                            matched.candidate_count,
                        ));
                    }
                }
                Err(err) => {
                    warn!(unit_id = %unit.unit_id, error = %err, "unit skipped");
                    summary.units_failed += 1;
                    summary.failures.push(UnitFailure {
                        unit_id: unit.unit_id.clone(),
                        reason: err.to_string(),
                    });
                    assignments.push(Assignment::sentinel(
                        unit,
                        AssignmentOutcome::Failed,
                        "",
                        0,
                    ));
                }
            }
        }

        summary.assignments = assignments
            .iter()
            .filter(|row| !row.is_sentinel())
            .count();
        summary.unique_candidates = assignments
            .iter()
            .filter_map(|row| row.candidate_id.as_deref())
            .collect::<HashSet<&str>>()
            .len();

        info!(
            units = summary.units_total,
            matched = summary.units_matched,
            no_match = summary.units_no_match,
            failed = summary.units_failed,
            assignments = summary.assignments,
            unique_candidates = summary.unique_candidates,
            ledger_rejections = summary.ledger_rejections,
            reclaimed = summary.reclaimed_candidates,
            "matching run completed"
        );

        MatchOutcome {
            assignments,
            summary,
        }
    }

    fn match_unit(
        &mut self,
        unit: &TextUnit,
        summary: &mut MatchSummary,
    ) -> Result<UnitMatch, MatchError> {
        let queries = self.queries.queries_for(unit);

        let mut pool = Vec::<Candidate>::new();
        for query in &queries {
            let retrieved = self
                .source
                .retrieve(query)
                .map_err(|err| MatchError::Retrieval {
                    unit_id: unit.unit_id.clone(),
                    reason: format!("{err:#}"),
                })?;
            pool.extend(
                retrieved
                    .into_iter()
                    .filter(|candidate| !candidate.candidate_id.trim().is_empty()),
            );
        }

        let candidate_count = pool.len();
        let scored = self
            .scorer
            .score_candidates(unit, pool)
            .map_err(|err| MatchError::Embedding {
                unit_id: unit.unit_id.clone(),
                reason: format!("{err:#}"),
            })?;

        let accepted = match self.claim_margin() {
            None => select(scored, self.config.min_score, self.config.top_k),
            Some(margin) => {
                let ranked = rank_admissible(scored, self.config.min_score);
                self.claim_shortlist(unit, ranked, margin, summary)
            }
        };

        Ok(UnitMatch {
            query: queries.join(" | "),
            candidate_count,
            accepted,
        })
    }

    /// Walks the ranked list, backfilling past rejected candidates until `top_k` are accepted.
    fn claim_shortlist(
        &mut self,
        unit: &TextUnit,
        ranked: Vec<ScoredCandidate>,
        margin: f64,
        summary: &mut MatchSummary,
    ) -> Vec<ScoredCandidate> {
        let mut accepted = Vec::<ScoredCandidate>::with_capacity(self.config.top_k);

        for entry in ranked {
            if accepted.len() >= self.config.top_k {
                break;
            }

            match self
                .ledger
                .try_claim(entry.candidate_id(), &unit.unit_id, entry.score, margin)
            {
                ClaimDecision::Fresh => accepted.push(entry),
                ClaimDecision::Reclaimed { previous } => {
                    info!(
                        candidate_id = %entry.candidate_id(),
                        unit_id = %unit.unit_id,
                        previous_unit_id = %previous.unit_id,
                        previous_score = previous.score,
                        score = entry.score,
                        "candidate reclaimed by stronger match"
                    );
                    summary.reclaimed_candidates += 1;
                    accepted.push(entry);
                }
                ClaimDecision::Rejected { held } => {
                    debug!(
                        candidate_id = %entry.candidate_id(),
                        unit_id = %unit.unit_id,
                        held_by = %held.unit_id,
                        held_score = held.score,
                        score = entry.score,
                        "candidate already claimed"
                    );
                    summary.ledger_rejections += 1;
                }
            }
        }

        accepted
    }

    fn claim_margin(&self) -> Option<f64> {
        match self.config.dedup_policy {
            DedupPolicy::Off => None,
            DedupPolicy::Strict => Some(f64::INFINITY),
            DedupPolicy::Margin => Some(self.config.dedup_margin),
        }
    }
}
