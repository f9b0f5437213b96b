use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::Result;

/// A message as handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

/// Messages arriving on one bound queue.
///
/// Implements [`Stream`]; the stream ends when the broker drops the queue.
pub struct Subscription {
    queue: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(queue: impl Into<String>, receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            queue: queue.into(),
            receiver,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the next delivery.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A topic-exchange message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a message. Succeeds once the broker has accepted it, even
    /// if no queue is bound.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> Result<()>;

    /// Declares a durable queue, binds it to `exchange` with `patterns` and
    /// starts consuming it.
    ///
    /// Messages routed to the queue while nobody consumes it are kept and
    /// delivered to the next subscription.
    async fn subscribe(
        &self,
        queue: &str,
        exchange: &str,
        patterns: &[String],
    ) -> Result<Subscription>;
}
