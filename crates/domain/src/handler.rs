//! Command handling infrastructure.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::{AggregateId, EventEnvelope, Page, PageRequest};
use messaging::EventPublisher;
use write_store::{OutboxStore, WriteStore, WriteStoreError, WriteStoreExt};

use crate::aggregate::Aggregate;
use crate::event::DomainEvent;
use crate::{DomainError, Result};

/// Executes commands against one aggregate.
///
/// Every command follows the same path:
/// 1. Validate the request into a new record state
/// 2. Pre-check business-unique keys for a friendly error
/// 3. Write the record and its event to the store in one transaction
/// 4. Publish the event and mark its outbox entry delivered, or record the
///    failure; an event queued behind an undelivered one is left to the relay
///
/// The store's uniqueness check in step 3 is authoritative; step 2 only
/// avoids a round trip in the common case.
pub struct CommandHandler<A: Aggregate> {
    store: Arc<dyn WriteStore<A>>,
    outbox: Arc<dyn OutboxStore>,
    publisher: EventPublisher,
}

impl<A: Aggregate> Clone for CommandHandler<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            outbox: Arc::clone(&self.outbox),
            publisher: self.publisher.clone(),
        }
    }
}

impl<A: Aggregate> CommandHandler<A> {
    /// Creates a handler over a store that also owns the outbox.
    pub fn new<S>(store: Arc<S>, publisher: EventPublisher) -> Self
    where
        S: WriteStore<A> + OutboxStore + 'static,
    {
        Self {
            store: store.clone(),
            outbox: store,
            publisher,
        }
    }

    pub fn store(&self) -> &Arc<dyn WriteStore<A>> {
        &self.store
    }

    /// Validates and inserts a new record.
    #[tracing::instrument(skip(self, draft), fields(aggregate = %A::KIND))]
    pub async fn create(&self, draft: A::Draft) -> Result<A> {
        self.observe("create", async {
            let id = AggregateId::new();
            let record = A::create(id, draft)?;
            self.check_unique(&record).await?;

            let event = DomainEvent::Created {
                id,
                fields: record.to_view(),
            }
            .to_envelope(A::KIND)?;

            self.store
                .insert(&record, &event)
                .await
                .map_err(Self::store_error)?;
            self.dispatch(&event).await;

            tracing::info!(%id, "record created");
            Ok(record)
        })
        .await
    }

    /// Validates a full replacement of an existing record.
    #[tracing::instrument(skip(self, draft), fields(aggregate = %A::KIND))]
    pub async fn update(&self, id: AggregateId, draft: A::Draft) -> Result<A> {
        self.modify(id, |current| {
            let record = current.update(draft)?;
            let fields = record.to_view();
            Ok((record, fields))
        })
        .await
    }

    /// Applies a change to an existing record.
    ///
    /// `change` returns the new record and the fields the Updated event
    /// carries, which may be a subset of the record.
    pub async fn modify<F>(&self, id: AggregateId, change: F) -> Result<A>
    where
        F: FnOnce(&A) -> Result<(A, A::View)> + Send,
    {
        self.observe("update", async {
            let current = self.store.require(id).await?;
            let (record, fields) = change(&current)?;
            self.check_unique(&record).await?;

            let event = DomainEvent::Updated { id, fields }.to_envelope(A::KIND)?;

            self.store
                .update(&record, &event)
                .await
                .map_err(Self::store_error)?;
            self.dispatch(&event).await;

            tracing::info!(%id, "record updated");
            Ok(record)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(aggregate = %A::KIND))]
    pub async fn delete(&self, id: AggregateId) -> Result<()> {
        self.observe("delete", async {
            let event = DomainEvent::<A::View>::Deleted { id }.to_envelope(A::KIND)?;

            self.store.delete(id, &event).await?;
            self.dispatch(&event).await;

            tracing::info!(%id, "record deleted");
            Ok(())
        })
        .await
    }

    /// Reads a record from the write store.
    pub async fn get(&self, id: AggregateId) -> Result<A> {
        Ok(self.store.require(id).await?)
    }

    /// Pages over the write store in insertion order.
    pub async fn list(&self, page: PageRequest) -> Result<Page<A>> {
        Ok(self.store.list(page).await?)
    }

    async fn check_unique(&self, record: &A) -> Result<()> {
        for key in record.unique_keys() {
            if let Some(holder) = self.store.find_by_key(&key).await?
                && holder.id() != record.id()
            {
                return Err(A::conflict(key.name, &key.value));
            }
        }
        Ok(())
    }

    /// Publishes a committed event unless an older event for the same
    /// record is still in the outbox, in which case the relay delivers both
    /// in commit order.
    async fn dispatch(&self, event: &EventEnvelope) {
        let event_id = event.event_id;
        match self.outbox.has_pending_before(event).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(%event_id, "earlier event still queued, leaving this one to the relay");
                return;
            }
            Err(err) => {
                tracing::warn!(%event_id, error = %err, "could not inspect the outbox, leaving event to the relay");
                return;
            }
        }

        let outcome = match self.publisher.deliver(event).await {
            Ok(()) => self.outbox.mark_published(event_id).await,
            Err(err) => self.outbox.record_failure(event_id, &err.to_string()).await,
        };
        if let Err(err) = outcome {
            tracing::warn!(%event_id, error = %err, "could not update outbox entry");
        }
    }

    fn store_error(err: WriteStoreError) -> DomainError {
        match err {
            WriteStoreError::DuplicateKey { key, value, .. } => A::conflict(&key, &value),
            other => other.into(),
        }
    }

    async fn observe<T>(
        &self,
        operation: &'static str,
        command: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let start = Instant::now();
        metrics::counter!("commands_total").increment(1);

        let result = command.await;

        metrics::histogram!("command_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            metrics::counter!("command_failures_total").increment(1);
            tracing::warn!(operation, error = %err, "command rejected");
        }
        result
    }
}
