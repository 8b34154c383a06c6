use std::collections::HashMap;

use crate::model::Assignment;

/// Absorbs float error in `best + margin` (0.80 + 0.05 is not exactly 0.85).
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub unit_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimDecision {
    /// Candidate had never been claimed.
    Fresh,
    /// Candidate beat its best earlier claim by at least the margin.
    Reclaimed { previous: Claim },
    /// Candidate is held by an earlier claim the proposal does not beat.
    Rejected { held: Claim },
}

#[cfg(test)]
impl ClaimDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Best score each candidate has been claimed at during one run.
///
/// Scores only ever increase. `try_claim` performs the check and the update as
/// one step and takes `&mut self`, so a shared ledger needs a single owner or
/// a lock around the whole call.
#[derive(Debug, Default, Clone)]
pub struct DedupLedger {
    claims: HashMap<String, Claim>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds claims from an earlier assignment table, keeping the best score per candidate.
    pub fn from_assignments(rows: &[Assignment]) -> Self {
        let mut ledger = Self::new();
        for row in rows {
            if let (Some(candidate_id), Some(score)) = (row.candidate_id.as_deref(), row.score) {
                ledger.record_claim(candidate_id, &row.unit_id, score);
            }
        }
        ledger
    }

    pub fn may_claim(&self, candidate_id: &str, proposed_score: f64, margin: f64) -> bool {
        match self.claims.get(candidate_id) {
            None => true,
            Some(held) => proposed_score + SCORE_EPSILON >= held.score + margin,
        }
    }

    /// Only call for candidates accepted into a unit's final assignments.
    pub fn record_claim(&mut self, candidate_id: &str, unit_id: &str, score: f64) {
        match self.claims.get_mut(candidate_id) {
            Some(held) if score > held.score => {
                held.score = score;
                held.unit_id = unit_id.to_string();
            }
            Some(_) => {}
            None => {
                self.claims.insert(
                    candidate_id.to_string(),
                    Claim {
                        unit_id: unit_id.to_string(),
                        score,
                    },
                );
            }
        }
    }

    pub fn try_claim(
        &mut self,
        candidate_id: &str,
        unit_id: &str,
        score: f64,
        margin: f64,
    ) -> ClaimDecision {
        match self.claims.get(candidate_id).cloned() {
            Some(held) if !self.may_claim(candidate_id, score, margin) => {
                ClaimDecision::Rejected { held }
            }
            previous => {
                self.record_claim(candidate_id, unit_id, score);
                match previous {
                    Some(previous) => ClaimDecision::Reclaimed { previous },
                    None => ClaimDecision::Fresh,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
impl DedupLedger {
    pub fn best_score(&self, candidate_id: &str) -> Option<f64> {
        self.claims.get(candidate_id).map(|claim| claim.score)
    }

    pub fn holder(&self, candidate_id: &str) -> Option<&str> {
        self.claims
            .get(candidate_id)
            .map(|claim| claim.unit_id.as_str())
    }
}
