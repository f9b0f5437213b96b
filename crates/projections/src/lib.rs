//! Read models and projections for the CQRS query side.
//!
//! This crate provides the query side of the CQRS pattern:
//! - [`DocumentStore`], a schemaless JSON document store (in-memory or PostgreSQL)
//! - [`ReadRepository`], typed access to one collection of read views
//! - [`Projection`] trait and [`ReadProjector`], which applies domain events
//!   to read views idempotently and in any order
//! - [`ProjectionWorker`] for feeding broker deliveries to projections

pub mod document;
pub mod error;
pub mod postgres;
pub mod projection;
pub mod projector;
pub mod repository;
pub mod worker;

pub use document::{DocumentStore, InMemoryDocumentStore};
pub use error::{ProjectionError, Result};
pub use postgres::PostgresDocumentStore;
pub use projection::{Projection, ProjectionPosition};
pub use projector::ReadProjector;
pub use repository::ReadRepository;
pub use worker::ProjectionWorker;
