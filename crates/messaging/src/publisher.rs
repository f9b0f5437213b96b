use std::sync::Arc;

use common::EventEnvelope;

use crate::{Result, broker::Broker, topology::Topology};

/// Publishes committed events to their aggregate's exchange.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    topology: Topology,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>, topology: Topology) -> Self {
        Self { broker, topology }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Publishes an event and reports broker failures to the caller.
    pub async fn try_publish(&self, event: &EventEnvelope) -> Result<()> {
        let exchange = self.topology.exchange_for(event.aggregate_type);
        let routing_key = event.routing_key();
        let payload = event.to_bytes()?;

        self.broker.publish(&exchange, &routing_key, payload).await?;
        metrics::counter!("events_published_total").increment(1);
        Ok(())
    }

    /// Publishes an event, logging and counting a failure before handing
    /// it back.
    #[tracing::instrument(
        skip(self, event),
        fields(routing_key = %event.routing_key(), event_id = %event.event_id)
    )]
    pub async fn deliver(&self, event: &EventEnvelope) -> Result<()> {
        self.try_publish(event).await.inspect_err(|err| {
            metrics::counter!("events_publish_failures_total").increment(1);
            tracing::error!(error = %err, "failed to publish event");
        })
    }

    /// Publishes an event without failing the caller.
    ///
    /// The write has already committed when this runs, so a broker failure
    /// is logged and counted and `false` is returned; the outbox relay
    /// delivers the event later.
    pub async fn publish(&self, event: &EventEnvelope) -> bool {
        self.deliver(event).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBroker;
    use common::{AggregateId, AggregateKind, EventKind};

    fn envelope(kind: EventKind) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_type(AggregateKind::Member)
            .aggregate_id(AggregateId::new())
            .event_kind(kind)
            .payload_raw(serde_json::json!({"kind": kind.as_str()}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn publishes_to_the_aggregate_exchange() {
        let broker = InMemoryBroker::new();
        let publisher = EventPublisher::new(Arc::new(broker.clone()), Topology::default());
        let event = envelope(EventKind::Updated);

        assert!(publisher.publish(&event).await);

        let published = broker.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "library.member");
        assert_eq!(published[0].routing_key, "member.updated");
        assert_eq!(
            EventEnvelope::from_bytes(&published[0].payload).unwrap(),
            event
        );
    }

    #[tokio::test]
    async fn broker_failure_is_swallowed() {
        let broker = InMemoryBroker::new();
        broker.set_fail_on_publish(true);
        let publisher = EventPublisher::new(Arc::new(broker.clone()), Topology::default());

        assert!(!publisher.publish(&envelope(EventKind::Created)).await);
        assert!(publisher.deliver(&envelope(EventKind::Deleted)).await.is_err());
        assert!(
            publisher
                .try_publish(&envelope(EventKind::Created))
                .await
                .is_err()
        );
    }
}
