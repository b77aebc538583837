//! Domain errors for the fedsync aggregation protocol.

use thiserror::Error;

/// Domain-level errors that can occur while accumulating or merging statistics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid aggregate entry for {key}: {successful} successes out of {total} attempts")]
    InvalidEntry { key: String, successful: u64, total: u64 },

    #[error("Invalid tactic key: {0}")]
    InvalidKey(String),

    #[error("Cannot merge entries with different keys: {left} and {right}")]
    KeyMismatch { left: String, right: String },

    #[error("Duplicate key in aggregate document: {0}")]
    DuplicateKey(String),

    #[error("Invalid state transition for round {round_number} from {from} to {to}")]
    InvalidStateTransition { round_number: u64, from: String, to: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
