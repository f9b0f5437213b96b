use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;

use crate::{EventEnvelope, Result};

/// An event written alongside a mutation, waiting to reach the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub envelope: EventEnvelope,

    /// Failed relay attempts so far.
    pub attempts: u32,

    pub last_error: Option<String>,

    /// Set once the broker has accepted the event.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn new(envelope: EventEnvelope) -> Self {
        Self {
            envelope,
            attempts: 0,
            last_error: None,
            published_at: None,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.envelope.event_id
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

/// Access to the outbox for the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Unpublished entries whose event was committed at or before `committed_before`,
    /// oldest first.
    async fn pending(
        &self,
        limit: usize,
        committed_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>>;

    /// Whether an older event for the same record is still waiting.
    ///
    /// While one is, `event` must go through the relay too, or it could
    /// reach the broker ahead of it.
    async fn has_pending_before(&self, event: &EventEnvelope) -> Result<bool>;

    /// Marks an entry as delivered. Unknown ids are ignored.
    async fn mark_published(&self, event_id: EventId) -> Result<()>;

    /// Records a failed delivery attempt.
    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<()>;
}
