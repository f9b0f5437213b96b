//! The contract between the projection worker and a read model.

use async_trait::async_trait;
use common::{AggregateKind, EventEnvelope, EventId};

use crate::Result;

/// How far a projection has got through its subscription.
///
/// Deliveries are unordered, so this is a count plus the last event seen,
/// not an offset that could be resumed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub applied: u64,
    pub last_event: Option<EventId>,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// The position after applying `event`.
    pub fn after(&self, event: EventId) -> Self {
        Self {
            applied: self.applied + 1,
            last_event: Some(event),
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.last_event {
            Some(event) => write!(f, "{} applied, last {event}", self.applied),
            None => write!(f, "{} applied", self.applied),
        }
    }
}

/// Keeps one aggregate's read model in step with its events.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// The aggregate whose events this projection consumes.
    fn follows(&self) -> AggregateKind;

    /// Applies one event. Must tolerate duplicates and any arrival order.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops the read model so it can be rebuilt from a replay.
    async fn reset(&self) -> Result<()>;
}
