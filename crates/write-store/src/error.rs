use thiserror::Error;

use crate::{AggregateId, AggregateKind};

/// Errors that can occur when interacting with the write store.
#[derive(Debug, Error)]
pub enum WriteStoreError {
    /// A business-unique value (or the primary key) is already taken.
    #[error("Duplicate {aggregate} {key}: {value}")]
    DuplicateKey {
        aggregate: AggregateKind,
        key: String,
        value: String,
    },

    /// No record with this id exists.
    #[error("{aggregate} not found: {id}")]
    NotFound {
        aggregate: AggregateKind,
        id: AggregateId,
    },

    /// The event handed to a mutation does not describe that mutation.
    #[error("Event does not match mutation: {0}")]
    EventMismatch(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for write store operations.
pub type Result<T> = std::result::Result<T, WriteStoreError>;
