//! Fetching records owned by other services.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateKind;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::PeerError;
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::registry::ServiceRegistry;

/// Fetches the canonical read record of a peer aggregate.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn fetch(&self, kind: AggregateKind, id: &str) -> Result<Value, PeerError>;
}

/// Timeout and circuit-breaker settings applied to every peer call.
#[derive(Debug, Clone)]
pub struct PeerPolicy {
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Default for PeerPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// [`PeerClient`] that issues `GET {base}/api/{collection}/{id}`.
///
/// The base URL is resolved through the registry on every call, so
/// re-registrations take effect immediately. Each service gets its own
/// breaker.
pub struct HttpPeerClient {
    http: reqwest::Client,
    registry: Arc<dyn ServiceRegistry>,
    policy: PeerPolicy,
    breakers: RwLock<HashMap<&'static str, Arc<CircuitBreaker>>>,
}

impl HttpPeerClient {
    pub fn new(registry: Arc<dyn ServiceRegistry>, policy: PeerPolicy) -> Result<Self, PeerError> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            registry,
            policy,
            breakers: RwLock::new(HashMap::new()),
        })
    }

    pub fn policy(&self) -> &PeerPolicy {
        &self.policy
    }

    /// The breaker guarding `service`, created on first use.
    pub async fn breaker(&self, service: &'static str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(service) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(service).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(service, self.policy.breaker.clone()))
        });
        Arc::clone(breaker)
    }

    async fn get(&self, service: &str, url: String) -> Result<Value, PeerError> {
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PeerError::Timeout(service.to_string())
            } else {
                PeerError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                service: service.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                PeerError::Timeout(service.to_string())
            } else {
                PeerError::Decode(e.to_string())
            }
        })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    #[tracing::instrument(skip(self), fields(service = kind.service_name()))]
    async fn fetch(&self, kind: AggregateKind, id: &str) -> Result<Value, PeerError> {
        let service = kind.service_name();
        let result = match self.registry.resolve(service).await {
            Some(base) => {
                let url = format!("{base}/api/{}/{id}", kind.collection());
                self.breaker(service)
                    .await
                    .call(|| self.get(service, url))
                    .await
            }
            None => Err(PeerError::RegistryMiss(service.to_string())),
        };

        if let Err(e) = &result {
            metrics::counter!("peer_requests_failed_total").increment(1);
            tracing::warn!(error = %e, "peer request failed");
        }
        result
    }
}
