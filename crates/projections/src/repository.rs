use std::marker::PhantomData;
use std::sync::Arc;

use common::{AggregateKind, Page, PageRequest};
use domain::ReadView;

use crate::{Result, document::DocumentStore};

/// Typed access to the read collection of one aggregate.
pub struct ReadRepository<V: ReadView> {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    _phantom: PhantomData<fn() -> V>,
}

impl<V: ReadView> Clone for ReadRepository<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection,
            _phantom: PhantomData,
        }
    }
}

impl<V: ReadView> ReadRepository<V> {
    pub fn new(store: Arc<dyn DocumentStore>, kind: AggregateKind) -> Self {
        Self {
            store,
            collection: kind.collection(),
            _phantom: PhantomData,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub async fn get(&self, id: &str) -> Result<Option<V>> {
        match self.store.get(self.collection, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, id: &str, view: &V) -> Result<()> {
        let doc = serde_json::to_value(view)?;
        self.store.upsert(self.collection, id, doc).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(self.collection, id).await
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<V>> {
        let page = self.store.list(self.collection, page).await?;
        let items = page
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<V>, _>>()?;
        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total: page.total,
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(self.collection).await
    }
}
