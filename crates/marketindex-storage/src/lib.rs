//! marketindex-storage — storage backends for the prediction-market indexer.
//!
//! Every backend implements both [`ProjectionStore`] (the relational
//! projection) and [`CheckpointStore`] (sync progress).
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - `sqlite` — SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres` — PostgreSQL via `sqlx` (production)
//!
//! [`ProjectionStore`]: marketindex_core::store::ProjectionStore
//! [`CheckpointStore`]: marketindex_core::checkpoint::CheckpointStore

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "memory")]
pub use memory::InMemoryStorage;
