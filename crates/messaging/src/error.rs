use thiserror::Error;

/// Errors raised by a broker or the publisher in front of it.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker refused or could not take the message.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The subscription's queue is gone.
    #[error("Subscription closed: {0}")]
    Closed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
