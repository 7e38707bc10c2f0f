//! Append-only event store boundary.
//!
//! One contract, two backends: [`InMemoryEventStore`] for tests and single-process
//! deployments, [`PostgresEventStore`] for durable storage.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{Committed, EventStore, EventStoreError, EventStream};
