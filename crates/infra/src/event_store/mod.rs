//! Event stream persistence.
//!
//! The trait keeps the dispatcher agnostic about storage. The in-memory
//! store covers tests and single-process runs; enabling the `postgres`
//! feature swaps in a durable backend with the same append semantics.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
