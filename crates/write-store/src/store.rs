use async_trait::async_trait;
use common::EventKind;

use crate::{
    AggregateId, EventEnvelope, Page, PageRequest, Result, WriteStoreError,
    record::{Record, UniqueKey},
};

/// Core trait for write store implementations.
///
/// Every mutation takes the event describing it. The record change and the
/// outbox entry for that event are committed atomically: either both are
/// visible afterwards or neither is.
#[async_trait]
pub trait WriteStore<R: Record>: Send + Sync {
    /// Inserts a new record.
    ///
    /// Fails with `DuplicateKey` if the id or any of the record's unique keys
    /// is already taken. This check is authoritative; callers may pre-check
    /// for friendlier errors but must not rely on the pre-check alone.
    async fn insert(&self, record: &R, event: &EventEnvelope) -> Result<()>;

    /// Replaces an existing record.
    ///
    /// Fails with `NotFound` if the record does not exist and with
    /// `DuplicateKey` if a changed unique key is held by another record.
    async fn update(&self, record: &R, event: &EventEnvelope) -> Result<()>;

    /// Deletes a record and releases its unique keys.
    async fn delete(&self, id: AggregateId, event: &EventEnvelope) -> Result<()>;

    async fn get(&self, id: AggregateId) -> Result<Option<R>>;

    /// Looks up the live record holding a unique key.
    async fn find_by_key(&self, key: &UniqueKey) -> Result<Option<R>>;

    /// Lists records in insertion order.
    async fn list(&self, page: PageRequest) -> Result<Page<R>>;
}

/// Extension trait providing convenience methods for write stores.
#[async_trait]
pub trait WriteStoreExt<R: Record>: WriteStore<R> {
    /// Loads a record or fails with `NotFound`.
    async fn require(&self, id: AggregateId) -> Result<R> {
        self.get(id).await?.ok_or(WriteStoreError::NotFound {
            aggregate: R::KIND,
            id,
        })
    }

    async fn exists(&self, id: AggregateId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

impl<R: Record, T: WriteStore<R> + ?Sized> WriteStoreExt<R> for T {}

/// Checks that an event describes the mutation it accompanies.
pub fn validate_event_for<R: Record>(
    id: AggregateId,
    expected: EventKind,
    event: &EventEnvelope,
) -> Result<()> {
    if event.aggregate_type != R::KIND {
        return Err(WriteStoreError::EventMismatch(format!(
            "event is for {}, record is {}",
            event.aggregate_type,
            R::KIND
        )));
    }
    if event.aggregate_id != id {
        return Err(WriteStoreError::EventMismatch(format!(
            "event is for {}, record is {}",
            event.aggregate_id, id
        )));
    }
    if event.event_kind != expected {
        return Err(WriteStoreError::EventMismatch(format!(
            "expected a {expected} event, got {}",
            event.event_kind
        )));
    }
    Ok(())
}
