//! Delivers outbox entries the immediate publish did not get through.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use write_store::OutboxStore;

use crate::publisher::EventPublisher;

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Entries fetched per pass.
    pub batch_size: usize,

    /// Entries younger than this are left to the immediate publish.
    pub grace: Duration,

    /// Pause between passes.
    pub interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            grace: Duration::from_secs(5),
            interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
}

/// Drains the outbox into the broker.
///
/// Entries go out in commit order and a pass stops at the first failure.
/// Command handlers hold back new events for a record that still has one
/// queued here, so events of one record reach the broker in commit order.
pub struct OutboxRelay<O: OutboxStore> {
    outbox: Arc<O>,
    publisher: EventPublisher,
    config: RelayConfig,
}

impl<O: OutboxStore + 'static> OutboxRelay<O> {
    pub fn new(outbox: Arc<O>, publisher: EventPublisher, config: RelayConfig) -> Self {
        Self {
            outbox,
            publisher,
            config,
        }
    }

    /// Runs a single pass over the pending entries.
    #[tracing::instrument(skip(self))]
    pub async fn relay_once(&self) -> write_store::Result<RelayReport> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let pending = self
            .outbox
            .pending(self.config.batch_size, Utc::now() - grace)
            .await?;

        let mut report = RelayReport::default();
        for entry in pending {
            let event_id = entry.event_id();
            match self.publisher.try_publish(&entry.envelope).await {
                Ok(()) => {
                    self.outbox.mark_published(event_id).await?;
                    metrics::counter!("outbox_relayed_total").increment(1);
                    report.published += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        %event_id,
                        attempts = entry.attempts + 1,
                        error = %err,
                        "outbox relay failed"
                    );
                    self.outbox
                        .record_failure(event_id, &err.to_string())
                        .await?;
                    report.failed += 1;
                    break;
                }
            }
        }

        if report.published > 0 {
            tracing::info!(published = report.published, "outbox entries relayed");
        }
        Ok(report)
    }

    /// Runs passes on a fixed interval until `shutdown` flips to `true` or
    /// its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.relay_once().await {
                        tracing::error!(error = %err, "outbox relay pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Broker, InMemoryBroker, Topology};
    use common::{AggregateId, AggregateKind, EventEnvelope, EventKind};
    use serde::{Deserialize, Serialize};
    use write_store::{InMemoryWriteStore, Record, WriteStore};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: AggregateId,
    }

    impl Record for Note {
        const KIND: AggregateKind = AggregateKind::Book;

        fn id(&self) -> AggregateId {
            self.id
        }
    }

    async fn commit_note(store: &InMemoryWriteStore) -> EventEnvelope {
        let note = Note {
            id: AggregateId::new(),
        };
        let event = EventEnvelope::builder()
            .aggregate_type(AggregateKind::Book)
            .aggregate_id(note.id)
            .event_kind(EventKind::Created)
            .payload(&note)
            .unwrap()
            .build()
            .unwrap();
        store.insert(&note, &event).await.unwrap();
        event
    }

    fn relay(
        store: &InMemoryWriteStore,
        broker: &InMemoryBroker,
        grace: Duration,
    ) -> OutboxRelay<InMemoryWriteStore> {
        OutboxRelay::new(
            Arc::new(store.clone()),
            EventPublisher::new(Arc::new(broker.clone()), Topology::default()),
            RelayConfig {
                batch_size: 10,
                grace,
                interval: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn relays_pending_entries_once() {
        let store = InMemoryWriteStore::new();
        let broker = InMemoryBroker::new();
        commit_note(&store).await;
        commit_note(&store).await;

        let relay = relay(&store, &broker, Duration::ZERO);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(
            report,
            RelayReport {
                published: 2,
                failed: 0
            }
        );

        let report = relay.relay_once().await.unwrap();
        assert_eq!(report, RelayReport::default());
        assert_eq!(broker.published().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_entries_stay_pending_until_the_broker_recovers() {
        let store = InMemoryWriteStore::new();
        let broker = InMemoryBroker::new();
        let event = commit_note(&store).await;
        commit_note(&store).await;
        broker.set_fail_on_publish(true);

        let relay = relay(&store, &broker, Duration::ZERO);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 0);

        let entries = store.outbox_entries().await;
        assert_eq!(entries[0].attempts, 1);
        assert_eq!(entries[1].attempts, 0);

        broker.set_fail_on_publish(false);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report.published, 2);
        let first = EventEnvelope::from_bytes(&broker.published().await[0].payload).unwrap();
        assert_eq!(first, event);
    }

    #[tokio::test]
    async fn fresh_entries_wait_out_the_grace_period() {
        let store = InMemoryWriteStore::new();
        let broker = InMemoryBroker::new();
        commit_note(&store).await;

        let relay = relay(&store, &broker, Duration::from_secs(3600));
        assert_eq!(relay.relay_once().await.unwrap(), RelayReport::default());
    }

    #[tokio::test]
    async fn run_delivers_and_stops_on_shutdown() {
        let store = InMemoryWriteStore::new();
        let broker = InMemoryBroker::new();
        let mut subscription = broker
            .subscribe("test.book", "library.book", &AggregateKind::Book.routing_patterns())
            .await
            .unwrap();
        commit_note(&store).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay(&store, &broker, Duration::ZERO).run(rx));

        let delivery = subscription.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "book.created");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
