//! Read queries over one aggregate's collection.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use common::{Page, PageRequest};
use domain::Aggregate;
use futures_util::future::join_all;
use projections::ReadRepository;
use serde::Serialize;
use serde_json::Value;

use crate::peer::PeerClient;
use crate::{QueryError, Result};

/// A read record with its referenced peer records inlined.
///
/// Each reference appears under its name; a peer that could not be
/// reached is `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeView<V> {
    #[serde(flatten)]
    pub record: V,
    #[serde(flatten)]
    pub related: BTreeMap<String, Option<Value>>,
}

pub struct QueryAggregator<A: Aggregate> {
    repository: ReadRepository<A::View>,
    peers: Arc<dyn PeerClient>,
    _phantom: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for QueryAggregator<A> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            peers: Arc::clone(&self.peers),
            _phantom: PhantomData,
        }
    }
}

impl<A: Aggregate> QueryAggregator<A> {
    pub fn new(repository: ReadRepository<A::View>, peers: Arc<dyn PeerClient>) -> Self {
        Self {
            repository,
            peers,
            _phantom: PhantomData,
        }
    }

    #[tracing::instrument(skip(self), fields(aggregate = %A::KIND))]
    pub async fn get_by_id(&self, id: &str) -> Result<A::View> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| QueryError::NotFound {
                aggregate: A::KIND,
                id: id.to_string(),
            })
    }

    #[tracing::instrument(skip(self), fields(aggregate = %A::KIND))]
    pub async fn list(&self, page: PageRequest) -> Result<Page<A::View>> {
        Ok(self.repository.list(page).await?)
    }

    /// Loads the record and fetches every referenced peer concurrently.
    ///
    /// Peer failures never fail the query.
    #[tracing::instrument(skip(self), fields(aggregate = %A::KIND))]
    pub async fn get_composite(&self, id: &str) -> Result<CompositeView<A::View>> {
        let record = self.get_by_id(id).await?;
        let references = A::references(&record);

        let fetches = references.iter().map(|reference| async move {
            match self.peers.fetch(reference.kind, &reference.id).await {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(
                        reference = reference.name,
                        id = %reference.id,
                        error = %e,
                        "leaving peer record empty"
                    );
                    None
                }
            }
        });
        let fetched = join_all(fetches).await;

        let related = references
            .iter()
            .zip(fetched)
            .map(|(reference, value)| (reference.name.to_string(), value))
            .collect();

        Ok(CompositeView { record, related })
    }
}
