//! Logical service name to base URL resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Resolves the base URL of a peer service, e.g. `member-service` to
/// `http://10.0.0.7:8080`.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn resolve(&self, service: &str) -> Option<String>;
}

/// A registry filled from configuration and editable at runtime.
#[derive(Clone, Default)]
pub struct StaticRegistry {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, url)| (name.into(), normalize(url.into())))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Adds or replaces the address of `service`.
    pub async fn register(&self, service: impl Into<String>, base_url: impl Into<String>) {
        let service = service.into();
        let base_url = normalize(base_url.into());
        tracing::info!(%service, %base_url, "service registered");
        self.entries.write().await.insert(service, base_url);
    }

    pub async fn deregister(&self, service: &str) -> Option<String> {
        let removed = self.entries.write().await.remove(service);
        if removed.is_some() {
            tracing::info!(%service, "service deregistered");
        }
        removed
    }

    pub async fn contains(&self, service: &str) -> bool {
        self.entries.read().await.contains_key(service)
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn resolve(&self, service: &str) -> Option<String> {
        self.entries.read().await.get(service).cloned()
    }
}

fn normalize(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
