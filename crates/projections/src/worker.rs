//! Feeds broker deliveries to projections.

use std::sync::Arc;

use common::EventEnvelope;
use messaging::{Delivery, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;
use crate::projection::Projection;

/// Drains one subscription and delivers every event to the registered
/// projections.
///
/// A delivery that cannot be decoded or applied is logged, counted and
/// skipped; the worker keeps consuming.
#[derive(Clone, Default)]
pub struct ProjectionWorker {
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a projection with this worker.
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Decodes a delivery and hands it to every projection.
    #[tracing::instrument(skip(self, delivery), fields(routing_key = %delivery.routing_key))]
    pub async fn process(&self, delivery: &Delivery) -> Result<()> {
        let event = EventEnvelope::from_bytes(&delivery.payload)?;
        self.process_event(&event).await
    }

    /// Delivers a single event to the projections that follow its aggregate.
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            if projection.follows() != event.aggregate_type {
                continue;
            }
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Consumes `subscription` until it ends or `shutdown` flips to `true`.
    pub async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        let queue = subscription.queue().to_string();
        tracing::info!(%queue, projections = self.projections.len(), "projection worker started");

        loop {
            tokio::select! {
                delivery = subscription.recv() => {
                    let Some(delivery) = delivery else {
                        tracing::warn!(%queue, "subscription closed");
                        break;
                    };
                    match self.process(&delivery).await {
                        Ok(()) => {
                            metrics::counter!("projection_events_applied_total").increment(1);
                        }
                        Err(err) => {
                            metrics::counter!("projection_events_failed_total").increment(1);
                            tracing::error!(
                                %queue,
                                routing_key = %delivery.routing_key,
                                error = %err,
                                "skipping delivery"
                            );
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(%queue, "projection worker stopped");
    }

    /// Runs the worker on its own task.
    pub fn spawn(
        self,
        subscription: Subscription,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(subscription, shutdown))
    }
}
