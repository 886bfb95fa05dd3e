//! Error kinds surfaced by the scoring core

use uuid::Uuid;

use crate::store::StoreError;

/// Errors returned by match setup, scoring and stats queries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("Point {got} is out of sequence for match {match_id} (expected {expected})")]
    OutOfSequence {
        match_id: Uuid,
        expected: u32,
        got: u32,
    },

    #[error("Match {0} is already complete")]
    MatchAlreadyComplete(Uuid),

    #[error("Invalid match configuration: {0}")]
    InvalidConfig(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl ScoringError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<StoreError> for ScoringError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(detail) => ScoringError::Conflict(detail),
            other => ScoringError::PersistenceFailure(other.to_string()),
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;
