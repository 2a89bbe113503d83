//! Actorstore Table: actor storage over a partitioned tabular store.
//!
//! Event-sourced actors are persisted as one append-only stream per
//! identity, with an optional full-state snapshot committed in the same
//! transaction as every append. Plain actors are persisted as a single row
//! guarded by its concurrency tag.

pub mod cache;
pub mod entity;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod stream;

pub use cache::{Table, TableCache};
pub use entity::{TableAction, TableEntity, TableError, TableStore};
pub use memory::InMemoryTableStore;
pub use postgres::PgTableStore;
pub use storage::ActorStorage;
