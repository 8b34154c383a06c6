use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Rejected before any unit is processed.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("candidate retrieval failed for unit {unit_id}: {reason}")]
    Retrieval { unit_id: String, reason: String },

    #[error("embedding failed for unit {unit_id}: {reason}")]
    Embedding { unit_id: String, reason: String },

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    EmbeddingShape { expected: usize, actual: usize },
}

impl MatchError {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
