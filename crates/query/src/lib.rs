//! Query side of the library services.
//!
//! - [`QueryAggregator`] answers reads from the local read store and builds
//!   composite views by fetching referenced records from peer services
//! - [`ServiceRegistry`] maps logical service names to base URLs
//! - [`PeerClient`] fetches peer records; [`HttpPeerClient`] does it over
//!   HTTP with a timeout and a per-service [`CircuitBreaker`]

pub mod aggregator;
pub mod breaker;
pub mod error;
pub mod peer;
pub mod registry;

pub use aggregator::{CompositeView, QueryAggregator};
pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use error::{PeerError, QueryError, Result};
pub use peer::{HttpPeerClient, PeerClient, PeerPolicy};
pub use registry::{ServiceRegistry, StaticRegistry};
