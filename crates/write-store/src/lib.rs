//! Strongly-consistent write side of every bounded context.
//!
//! A [`WriteStore`] keeps one table per aggregate, enforces business-unique
//! keys at the storage layer and writes the outgoing event into an outbox
//! inside the same transaction as the mutation. [`OutboxStore`] exposes the
//! outbox to the relay that guarantees eventual delivery.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{AggregateId, AggregateKind, EventEnvelope, Page, PageRequest};
pub use error::{Result, WriteStoreError};
pub use memory::InMemoryWriteStore;
pub use outbox::{OutboxEntry, OutboxStore};
pub use postgres::PostgresWriteStore;
pub use record::{Record, UniqueKey};
pub use store::{WriteStore, WriteStoreExt};
