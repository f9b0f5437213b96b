//! Event transport between bounded contexts.
//!
//! Each aggregate publishes to its own topic exchange under routing keys of
//! the form `<aggregate>.<created|updated|deleted>`. Consumers bind durable
//! queues with patterns. The [`Broker`] trait is the seam for a real
//! message broker; [`InMemoryBroker`] implements it in-process.

pub mod broker;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod relay;
pub mod topic;
pub mod topology;

pub use broker::{Broker, Delivery, Subscription};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use publisher::EventPublisher;
pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use topic::topic_matches;
pub use topology::Topology;
