use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, EventKind};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateKind, EventEnvelope, Page, PageRequest, Result, WriteStoreError,
    outbox::{OutboxEntry, OutboxStore},
    record::{Record, UniqueKey},
    store::{WriteStore, validate_event_for},
};

type KeySlot = (AggregateKind, &'static str, String);

struct Row {
    seq: u64,
    body: Value,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    rows: HashMap<(AggregateKind, AggregateId), Row>,
    keys: HashMap<KeySlot, AggregateId>,
    /// Undelivered events by commit sequence. Delivered ones are dropped.
    outbox: BTreeMap<u64, OutboxEntry>,
    outbox_index: HashMap<EventId, u64>,
}

impl State {
    fn conflicting_key(
        &self,
        kind: AggregateKind,
        id: AggregateId,
        keys: &[UniqueKey],
    ) -> Option<WriteStoreError> {
        keys.iter().find_map(|key| {
            let holder = self.keys.get(&(kind, key.name, key.value.clone()))?;
            (*holder != id).then(|| WriteStoreError::DuplicateKey {
                aggregate: kind,
                key: key.name.to_string(),
                value: key.value.clone(),
            })
        })
    }

    fn release_keys(&mut self, kind: AggregateKind, id: AggregateId) {
        self.keys
            .retain(|(slot_kind, _, _), holder| !(*slot_kind == kind && *holder == id));
    }

    fn enqueue(&mut self, event: &EventEnvelope) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outbox_index.insert(event.event_id, seq);
        self.outbox.insert(seq, OutboxEntry::new(event.clone()));
    }

    fn outbox_entry_mut(&mut self, event_id: EventId) -> Option<&mut OutboxEntry> {
        let seq = self.outbox_index.get(&event_id)?;
        self.outbox.get_mut(seq)
    }

    fn claim_keys(&mut self, kind: AggregateKind, id: AggregateId, keys: Vec<UniqueKey>) {
        for key in keys {
            self.keys.insert((kind, key.name, key.value), id);
        }
    }
}

/// In-memory write store for tests and single-process deployments.
///
/// All aggregates share one lock, so a mutation, its key claims and its
/// outbox entry are applied together exactly like the PostgreSQL
/// transaction.
#[derive(Clone, Default)]
pub struct InMemoryWriteStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryWriteStore {
    /// Creates a new empty in-memory write store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records of one kind.
    pub async fn record_count(&self, kind: AggregateKind) -> usize {
        self.state
            .read()
            .await
            .rows
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Returns the undelivered outbox entries in commit order.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.read().await.outbox.values().cloned().collect()
    }

    /// Clears all records, keys and outbox entries.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

#[async_trait]
impl<R: Record> WriteStore<R> for InMemoryWriteStore {
    async fn insert(&self, record: &R, event: &EventEnvelope) -> Result<()> {
        let id = record.id();
        validate_event_for::<R>(id, EventKind::Created, event)?;
        let body = serde_json::to_value(record)?;
        let keys = record.unique_keys();

        let mut state = self.state.write().await;

        if state.rows.contains_key(&(R::KIND, id)) {
            return Err(WriteStoreError::DuplicateKey {
                aggregate: R::KIND,
                key: "id".to_string(),
                value: id.to_string(),
            });
        }
        if let Some(conflict) = state.conflicting_key(R::KIND, id, &keys) {
            return Err(conflict);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.rows.insert((R::KIND, id), Row { seq, body });
        state.claim_keys(R::KIND, id, keys);
        state.enqueue(event);

        Ok(())
    }

    async fn update(&self, record: &R, event: &EventEnvelope) -> Result<()> {
        let id = record.id();
        validate_event_for::<R>(id, EventKind::Updated, event)?;
        let body = serde_json::to_value(record)?;
        let keys = record.unique_keys();

        let mut state = self.state.write().await;

        if !state.rows.contains_key(&(R::KIND, id)) {
            return Err(WriteStoreError::NotFound {
                aggregate: R::KIND,
                id,
            });
        }
        if let Some(conflict) = state.conflicting_key(R::KIND, id, &keys) {
            return Err(conflict);
        }

        if let Some(row) = state.rows.get_mut(&(R::KIND, id)) {
            row.body = body;
        }
        state.release_keys(R::KIND, id);
        state.claim_keys(R::KIND, id, keys);
        state.enqueue(event);

        Ok(())
    }

    async fn delete(&self, id: AggregateId, event: &EventEnvelope) -> Result<()> {
        validate_event_for::<R>(id, EventKind::Deleted, event)?;

        let mut state = self.state.write().await;

        if state.rows.remove(&(R::KIND, id)).is_none() {
            return Err(WriteStoreError::NotFound {
                aggregate: R::KIND,
                id,
            });
        }
        state.release_keys(R::KIND, id);
        state.enqueue(event);

        Ok(())
    }

    async fn get(&self, id: AggregateId) -> Result<Option<R>> {
        let state = self.state.read().await;
        match state.rows.get(&(R::KIND, id)) {
            Some(row) => Ok(Some(serde_json::from_value(row.body.clone())?)),
            None => Ok(None),
        }
    }

    async fn find_by_key(&self, key: &UniqueKey) -> Result<Option<R>> {
        let holder = {
            let state = self.state.read().await;
            state
                .keys
                .get(&(R::KIND, key.name, key.value.clone()))
                .copied()
        };
        match holder {
            Some(id) => WriteStore::<R>::get(self, id).await,
            None => Ok(None),
        }
    }

    async fn list(&self, page: PageRequest) -> Result<Page<R>> {
        let state = self.state.read().await;
        let mut rows: Vec<&Row> = state
            .rows
            .iter()
            .filter(|((kind, _), _)| *kind == R::KIND)
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| row.seq);

        let page = Page::from_sorted(rows, page);
        let items = page
            .items
            .iter()
            .map(|row| serde_json::from_value(row.body.clone()))
            .collect::<std::result::Result<Vec<R>, _>>()?;
        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total: page.total,
        })
    }
}

#[async_trait]
impl OutboxStore for InMemoryWriteStore {
    async fn pending(
        &self,
        limit: usize,
        committed_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .values()
            .filter(|entry| entry.envelope.timestamp <= committed_before)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn has_pending_before(&self, event: &EventEnvelope) -> Result<bool> {
        let state = self.state.read().await;
        let upto = state
            .outbox_index
            .get(&event.event_id)
            .copied()
            .unwrap_or(u64::MAX);
        Ok(state.outbox.range(..upto).any(|(_, entry)| {
            entry.envelope.aggregate_type == event.aggregate_type
                && entry.envelope.aggregate_id == event.aggregate_id
        }))
    }

    async fn mark_published(&self, event_id: EventId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(seq) = state.outbox_index.remove(&event_id) {
            state.outbox.remove(&seq);
        }
        Ok(())
    }

    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.outbox_entry_mut(event_id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::Shelf;
    use crate::store::WriteStoreExt;

    fn event_for(shelf: &Shelf, kind: EventKind) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_type(AggregateKind::Book)
            .aggregate_id(shelf.id)
            .event_kind(kind)
            .payload(shelf)
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = InMemoryWriteStore::new();
        let shelf = Shelf::new("A-1", "Fiction");

        store
            .insert(&shelf, &event_for(&shelf, EventKind::Created))
            .await
            .unwrap();

        let loaded: Shelf = store.require(shelf.id).await.unwrap();
        assert_eq!(loaded, shelf);
        assert_eq!(store.record_count(AggregateKind::Book).await, 1);
    }

    #[tokio::test]
    async fn duplicate_unique_key_is_rejected() {
        let store = InMemoryWriteStore::new();
        let first = Shelf::new("A-1", "Fiction");
        let second = Shelf::new("A-1", "Poetry");

        store
            .insert(&first, &event_for(&first, EventKind::Created))
            .await
            .unwrap();
        let result = store
            .insert(&second, &event_for(&second, EventKind::Created))
            .await;

        match result {
            Err(WriteStoreError::DuplicateKey { key, value, .. }) => {
                assert_eq!(key, "code");
                assert_eq!(value, "A-1");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
        // A rejected mutation leaves no outbox entry behind.
        assert_eq!(store.outbox_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn update_may_keep_its_own_key_but_not_take_another() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        let b = Shelf::new("B-1", "Poetry");
        store.insert(&a, &event_for(&a, EventKind::Created)).await.unwrap();
        store.insert(&b, &event_for(&b, EventKind::Created)).await.unwrap();

        let mut renamed = a.clone();
        renamed.label = "Novels".to_string();
        store
            .update(&renamed, &event_for(&renamed, EventKind::Updated))
            .await
            .unwrap();

        let mut stolen = b.clone();
        stolen.code = "A-1".to_string();
        let result = store
            .update(&stolen, &event_for(&stolen, EventKind::Updated))
            .await;
        assert!(matches!(result, Err(WriteStoreError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn update_releases_the_old_key() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        store.insert(&a, &event_for(&a, EventKind::Created)).await.unwrap();

        let mut moved = a.clone();
        moved.code = "A-2".to_string();
        store
            .update(&moved, &event_for(&moved, EventKind::Updated))
            .await
            .unwrap();

        let found: Option<Shelf> = store.find_by_key(&UniqueKey::new("code", "A-1")).await.unwrap();
        assert!(found.is_none());
        let found: Option<Shelf> = store.find_by_key(&UniqueKey::new("code", "A-2")).await.unwrap();
        assert_eq!(found, Some(moved));
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_record_fail() {
        let store = InMemoryWriteStore::new();
        let ghost = Shelf::new("Z-9", "Nothing");

        let result = store
            .update(&ghost, &event_for(&ghost, EventKind::Updated))
            .await;
        assert!(matches!(result, Err(WriteStoreError::NotFound { .. })));

        let result = WriteStore::<Shelf>::delete(
            &store,
            ghost.id,
            &event_for(&ghost, EventKind::Deleted),
        )
        .await;
        assert!(matches!(result, Err(WriteStoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_frees_the_key_for_reuse() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        store.insert(&a, &event_for(&a, EventKind::Created)).await.unwrap();
        WriteStore::<Shelf>::delete(&store, a.id, &event_for(&a, EventKind::Deleted))
            .await
            .unwrap();

        let again = Shelf::new("A-1", "Fiction again");
        store
            .insert(&again, &event_for(&again, EventKind::Created))
            .await
            .unwrap();
        assert!(!WriteStoreExt::<Shelf>::exists(&store, a.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_pages_in_insertion_order() {
        let store = InMemoryWriteStore::new();
        let mut codes = Vec::new();
        for i in 0..5 {
            let shelf = Shelf::new(&format!("S-{i}"), "x");
            store
                .insert(&shelf, &event_for(&shelf, EventKind::Created))
                .await
                .unwrap();
            codes.push(shelf.code);
        }

        let page: Page<Shelf> = store.list(PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let listed: Vec<_> = page.items.into_iter().map(|s| s.code).collect();
        assert_eq!(listed, codes[2..4].to_vec());
    }

    #[tokio::test]
    async fn outbox_tracks_publication_and_failures() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        let b = Shelf::new("B-1", "Poetry");
        let ev_a = event_for(&a, EventKind::Created);
        let ev_b = event_for(&b, EventKind::Created);
        store.insert(&a, &ev_a).await.unwrap();
        store.insert(&b, &ev_b).await.unwrap();

        store.mark_published(ev_a.event_id).await.unwrap();
        store.record_failure(ev_b.event_id, "broker down").await.unwrap();

        let pending = store.pending(10, Utc::now()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id(), ev_b.event_id);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));
    }

    #[tokio::test]
    async fn delivered_entries_leave_the_outbox() {
        let store = InMemoryWriteStore::new();
        for i in 0..50 {
            let shelf = Shelf::new(&format!("S-{i}"), "x");
            let event = event_for(&shelf, EventKind::Created);
            store.insert(&shelf, &event).await.unwrap();
            store.mark_published(event.event_id).await.unwrap();
        }

        assert!(store.outbox_entries().await.is_empty());
        let state = store.state.read().await;
        assert!(state.outbox_index.is_empty());
    }

    #[tokio::test]
    async fn pending_before_only_sees_older_events_of_the_same_record() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        let b = Shelf::new("B-1", "Poetry");
        let created_a = event_for(&a, EventKind::Created);
        let created_b = event_for(&b, EventKind::Created);
        store.insert(&a, &created_a).await.unwrap();
        store.insert(&b, &created_b).await.unwrap();

        let mut renamed = a.clone();
        renamed.label = "Novels".to_string();
        let updated_a = event_for(&renamed, EventKind::Updated);
        store.update(&renamed, &updated_a).await.unwrap();

        assert!(!store.has_pending_before(&created_a).await.unwrap());
        assert!(!store.has_pending_before(&created_b).await.unwrap());
        assert!(store.has_pending_before(&updated_a).await.unwrap());

        store.mark_published(created_a.event_id).await.unwrap();
        assert!(!store.has_pending_before(&updated_a).await.unwrap());
    }

    #[tokio::test]
    async fn pending_skips_entries_younger_than_the_cutoff() {
        let store = InMemoryWriteStore::new();
        let a = Shelf::new("A-1", "Fiction");
        store.insert(&a, &event_for(&a, EventKind::Created)).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::seconds(60);
        assert!(store.pending(10, cutoff).await.unwrap().is_empty());
    }
}
