//! Shared types for the library bounded contexts.
//!
//! Everything in here crosses a crate or process boundary: record
//! identifiers, the aggregate catalogue with its routing keys, the event
//! envelope carried by the broker and the paging types used by list queries.

pub mod envelope;
pub mod kind;
pub mod page;
pub mod types;

pub use envelope::{EventEnvelope, EventEnvelopeBuilder, MissingField};
pub use kind::{AggregateKind, EventKind, UnknownAggregate};
pub use page::{Page, PageRequest};
pub use types::{AggregateId, EventId};
