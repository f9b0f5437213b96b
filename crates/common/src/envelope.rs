use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AggregateId, AggregateKind, EventId, EventKind};

/// The message that travels from a write store, through the outbox and the
/// broker, to a read projector.
///
/// `payload` holds the tagged domain event (`{"kind": ..., "id": ..., ...}`);
/// the other fields are routing and bookkeeping data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub aggregate_type: AggregateKind,
    pub aggregate_id: AggregateId,
    pub event_kind: EventKind,
    /// Commit time on the write side.
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Free-form annotations such as the originating service.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Routing key on the aggregate's topic exchange.
    pub fn routing_key(&self) -> String {
        self.aggregate_type.routing_key(self.event_kind)
    }

    /// Encodes the envelope as the JSON body of a broker message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a broker message body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A required envelope field was never set on the builder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event envelope is missing `{0}`")]
pub struct MissingField(pub &'static str);

/// Assembles an [`EventEnvelope`]. The event id and timestamp are assigned
/// at [`build`](Self::build) time.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    kind: Option<AggregateKind>,
    id: Option<AggregateId>,
    event: Option<EventKind>,
    body: Option<serde_json::Value>,
    annotations: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn aggregate_type(self, kind: AggregateKind) -> Self {
        Self {
            kind: Some(kind),
            ..self
        }
    }

    pub fn aggregate_id(self, id: AggregateId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn event_kind(self, event: EventKind) -> Self {
        Self {
            event: Some(event),
            ..self
        }
    }

    /// Serializes `value` as the payload.
    pub fn payload<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_value(value)?;
        Ok(self.payload_raw(body))
    }

    pub fn payload_raw(self, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.annotations.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<EventEnvelope, MissingField> {
        let aggregate_type = self.kind.ok_or(MissingField("aggregate_type"))?;
        let aggregate_id = self.id.ok_or(MissingField("aggregate_id"))?;
        let event_kind = self.event.ok_or(MissingField("event_kind"))?;
        let payload = self.body.ok_or(MissingField("payload"))?;

        Ok(EventEnvelope {
            event_id: EventId::new(),
            aggregate_type,
            aggregate_id,
            event_kind,
            timestamp: Utc::now(),
            payload,
            metadata: self.annotations,
        })
    }
}
