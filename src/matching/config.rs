use serde::Serialize;

use super::error::MatchError;

pub const DEFAULT_MIN_SCORE: f64 = 0.4;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_DEDUP_MARGIN: f64 = 0.05;
pub const DEFAULT_MAX_QUERY_TERMS: usize = 6;
pub const DEFAULT_RANK_THRESHOLD: usize = 5;

/// How claims made by earlier units constrain later ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// No ledger; every unit sees every candidate.
    Off,
    /// A claimed candidate is never claimed again.
    Strict,
    /// A claimed candidate may be claimed again at `best + margin` or above.
    Margin,
}

impl DedupPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Strict => "strict",
            Self::Margin => "margin",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchConfig {
    pub min_score: f64,
    pub top_k: usize,
    pub dedup_margin: f64,
    pub dedup_policy: DedupPolicy,
    /// Weight of the lexical Jaccard score in the blended score; 0 disables blending.
    pub lexical_weight: f64,
    pub max_query_terms: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            top_k: DEFAULT_TOP_K,
            dedup_margin: DEFAULT_DEDUP_MARGIN,
            dedup_policy: DedupPolicy::Margin,
            lexical_weight: 0.0,
            max_query_terms: DEFAULT_MAX_QUERY_TERMS,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.min_score.is_finite() || !(0.0..=1.0).contains(&self.min_score) {
            return Err(MatchError::invalid_configuration(format!(
                "min_score must be within [0, 1], got {}",
                self.min_score
            )));
        }

        if self.top_k < 1 {
            return Err(MatchError::invalid_configuration("top_k must be at least 1"));
        }

        if !self.dedup_margin.is_finite() || self.dedup_margin < 0.0 {
            return Err(MatchError::invalid_configuration(format!(
                "dedup_margin must be a non-negative number, got {}",
                self.dedup_margin
            )));
        }

        if !self.lexical_weight.is_finite() || !(0.0..=1.0).contains(&self.lexical_weight) {
            return Err(MatchError::invalid_configuration(format!(
                "lexical_weight must be within [0, 1], got {}",
                self.lexical_weight
            )));
        }

        if self.max_query_terms < 1 {
            return Err(MatchError::invalid_configuration(
                "max_query_terms must be at least 1",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PosthocConfig {
    pub rank_threshold: usize,
    pub dedup: bool,
}

impl Default for PosthocConfig {
    fn default() -> Self {
        Self {
            rank_threshold: DEFAULT_RANK_THRESHOLD,
            dedup: true,
        }
    }
}

impl PosthocConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.rank_threshold < 1 {
            return Err(MatchError::invalid_configuration(
                "rank_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}
