use common::AggregateKind;
use projections::ProjectionError;
use thiserror::Error;

/// Errors returned to callers of the query side.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: AggregateKind, id: String },

    #[error("Read store error: {0}")]
    ReadStore(#[from] ProjectionError),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Why a peer record could not be fetched.
///
/// Never surfaced to HTTP callers: a failed peer leaves its slot in a
/// composite view empty.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("no address registered for {0}")]
    RegistryMiss(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{service} answered {status}")]
    Status { service: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("undecodable response: {0}")]
    Decode(String),
}

impl PeerError {
    /// Whether the failure says something about the peer's health.
    ///
    /// A 4xx answer is a healthy peer rejecting one request and does not
    /// count towards opening the circuit.
    pub fn trips_breaker(&self) -> bool {
        match self {
            PeerError::Timeout(_) | PeerError::Transport(_) => true,
            PeerError::Status { status, .. } => *status >= 500,
            PeerError::RegistryMiss(_) | PeerError::CircuitOpen(_) | PeerError::Decode(_) => {
                false
            }
        }
    }
}
