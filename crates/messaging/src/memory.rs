use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{
    BrokerError, Result,
    broker::{Broker, Delivery, Subscription},
    topic::topic_matches,
};

/// How many recent deliveries [`InMemoryBroker::published`] remembers.
const PUBLISHED_LOG_LEN: usize = 1024;

struct Queue {
    exchange: String,
    patterns: Vec<String>,
    consumer: Option<mpsc::UnboundedSender<Delivery>>,
    backlog: Vec<Delivery>,
}

impl Queue {
    fn routes(&self, exchange: &str, routing_key: &str) -> bool {
        self.exchange == exchange
            && self
                .patterns
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key))
    }

    fn deliver(&mut self, delivery: Delivery) {
        let undelivered = match &self.consumer {
            Some(sender) => sender.send(delivery).err().map(|e| e.0),
            None => Some(delivery),
        };
        if let Some(delivery) = undelivered {
            self.consumer = None;
            self.backlog.push(delivery);
        }
    }
}

/// In-process broker with topic exchanges and durable queues.
///
/// Clones share the same exchanges and queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    queues: Arc<RwLock<HashMap<String, Queue>>>,
    published: Arc<RwLock<VecDeque<Delivery>>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the broker to refuse every publish (for testing).
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// The most recently accepted messages, oldest first.
    pub async fn published(&self) -> Vec<Delivery> {
        self.published.read().await.iter().cloned().collect()
    }

    /// Messages waiting in a queue that has no active consumer.
    pub async fn backlog_len(&self, queue: &str) -> usize {
        self.queues
            .read()
            .await
            .get(queue)
            .map_or(0, |q| q.backlog.len())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(format!(
                "publish to {exchange} refused"
            )));
        }

        let delivery = Delivery {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        };

        let mut queues = self.queues.write().await;
        for queue in queues
            .values_mut()
            .filter(|q| q.routes(exchange, routing_key))
        {
            queue.deliver(delivery.clone());
        }
        drop(queues);

        let mut published = self.published.write().await;
        if published.len() == PUBLISHED_LOG_LEN {
            published.pop_front();
        }
        published.push_back(delivery);
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        exchange: &str,
        patterns: &[String],
    ) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut queues = self.queues.write().await;

        let entry = queues.entry(queue.to_string()).or_insert_with(|| Queue {
            exchange: exchange.to_string(),
            patterns: Vec::new(),
            consumer: None,
            backlog: Vec::new(),
        });
        if entry.exchange != exchange {
            return Err(BrokerError::Closed(format!(
                "queue {queue} is bound to {}, not {exchange}",
                entry.exchange
            )));
        }
        for pattern in patterns {
            if !entry.patterns.contains(pattern) {
                entry.patterns.push(pattern.clone());
            }
        }
        for delivery in entry.backlog.drain(..) {
            // The receiver is alive; it is held below.
            let _ = sender.send(delivery);
        }
        entry.consumer = Some(sender);

        tracing::debug!(queue, exchange, ?patterns, "queue bound");
        Ok(Subscription::new(queue, receiver))
    }
}
