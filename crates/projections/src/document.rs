//! Schemaless document storage for read views.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Page, PageRequest};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::Result;

/// A store of JSON documents grouped into collections and keyed by text ids.
///
/// There are no uniqueness rules beyond the key; documents may be partial.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Inserts or replaces a document. A replaced document keeps its place
    /// in listing order.
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()>;

    /// Removes a document, returning whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Lists a collection in first-insertion order.
    async fn list(&self, collection: &str, page: PageRequest) -> Result<Page<Value>>;

    /// Removes every document of a collection.
    async fn clear(&self, collection: &str) -> Result<()>;
}

#[derive(Default)]
struct Collection {
    next_seq: u64,
    documents: HashMap<String, (u64, Value)>,
}

/// In-memory document store for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(collection.to_string()).or_default();

        match collection.documents.get_mut(id) {
            Some((_, existing)) => *existing = document,
            None => {
                let seq = collection.next_seq;
                collection.next_seq += 1;
                collection.documents.insert(id.to_string(), (seq, document));
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|c| c.documents.remove(id))
            .is_some())
    }

    async fn list(&self, collection: &str, page: PageRequest) -> Result<Page<Value>> {
        let collections = self.collections.read().await;
        let mut documents: Vec<&(u64, Value)> = collections
            .get(collection)
            .map(|c| c.documents.values().collect())
            .unwrap_or_default();
        documents.sort_by_key(|(seq, _)| *seq);

        Ok(Page::from_sorted(documents, page).map(|(_, doc)| doc.clone()))
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}
