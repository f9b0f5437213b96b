//! Domain error types.

use common::{AggregateKind, MissingField};
use thiserror::Error;
use write_store::WriteStoreError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A business-unique value is already taken.
    #[error("Duplicate {key}: {value}")]
    DuplicateKey { key: String, value: String },

    /// The addressed record does not exist.
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: AggregateKind, id: String },

    /// The request is well-formed but the domain forbids it.
    #[error("Business rule violated: {0}")]
    BusinessRuleViolation(String),

    /// The request payload failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An error occurred in the write store.
    #[error("Write store error: {0}")]
    Store(WriteStoreError),

    #[error("Event envelope error: {0}")]
    Envelope(#[from] MissingField),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(aggregate: AggregateKind, id: impl ToString) -> Self {
        DomainError::NotFound {
            aggregate,
            id: id.to_string(),
        }
    }
}

impl From<WriteStoreError> for DomainError {
    fn from(e: WriteStoreError) -> Self {
        match e {
            WriteStoreError::DuplicateKey { key, value, .. } => {
                DomainError::DuplicateKey { key, value }
            }
            WriteStoreError::NotFound { aggregate, id } => DomainError::not_found(aggregate, id),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
