use common::{AggregateId, AggregateKind, EventEnvelope, EventKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// What happened to a record, as carried in an envelope's payload.
///
/// Serialized with a `kind` tag:
/// `{"kind": "updated", "id": "...", "fields": {"status": "RETURNED"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent<V> {
    /// A record was inserted; `fields` is the full snapshot.
    Created { id: AggregateId, fields: V },

    /// A record changed; `fields` holds the full snapshot or, for a patch,
    /// only the fields that changed.
    Updated { id: AggregateId, fields: V },

    Deleted { id: AggregateId },
}

impl<V> DomainEvent<V> {
    pub fn id(&self) -> AggregateId {
        match self {
            DomainEvent::Created { id, .. }
            | DomainEvent::Updated { id, .. }
            | DomainEvent::Deleted { id } => *id,
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            DomainEvent::Created { .. } => EventKind::Created,
            DomainEvent::Updated { .. } => EventKind::Updated,
            DomainEvent::Deleted { .. } => EventKind::Deleted,
        }
    }
}

impl<V: Serialize> DomainEvent<V> {
    /// Wraps the event for the write store outbox and the broker.
    pub fn to_envelope(&self, aggregate: AggregateKind) -> Result<EventEnvelope> {
        Ok(EventEnvelope::builder()
            .aggregate_type(aggregate)
            .aggregate_id(self.id())
            .event_kind(self.event_kind())
            .payload(self)?
            .build()?)
    }
}

impl<V: DeserializeOwned> DomainEvent<V> {
    pub fn from_envelope(envelope: &EventEnvelope) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_value(envelope.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoanView;
    use crate::loan::LoanStatus;

    #[test]
    fn wire_form_is_tagged_by_kind() {
        let id = AggregateId::new();
        let event = DomainEvent::Updated {
            id,
            fields: LoanView {
                status: Some(LoanStatus::Returned),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "updated",
                "id": id.to_string(),
                "fields": {"status": "RETURNED"}
            })
        );
    }

    #[test]
    fn envelope_carries_routing_data() {
        let id = AggregateId::new();
        let event: DomainEvent<LoanView> = DomainEvent::Deleted { id };
        let envelope = event.to_envelope(AggregateKind::Loan).unwrap();

        assert_eq!(envelope.aggregate_id, id);
        assert_eq!(envelope.routing_key(), "loan.deleted");
        assert_eq!(
            DomainEvent::<LoanView>::from_envelope(&envelope).unwrap(),
            event
        );
    }
}
