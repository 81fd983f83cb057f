//! marketindex-core — domain model, projection engine, and checkpointing for
//! the prediction-market log indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → SyncLoop
//!                      ├── Cursor            (next chunk, confirmation depth)
//!                      ├── EvmFetcher        (eth_blockNumber / eth_getLogs)
//!                      ├── EventDecoder      (topic0 → DomainEvent)
//!                      ├── Projector         (DomainEvent → relational rows)
//!                      ├── CheckpointManager (crash recovery)
//!                      └── Storage backend   (memory / SQLite / Postgres)
//! ```
//!
//! This crate holds everything that does not touch the network: the types
//! flowing through the pipeline and the storage seams the backends implement.

pub mod checkpoint;
pub mod cursor;
pub mod error;
pub mod event;
pub mod indexer;
pub mod model;
pub mod projection;
pub mod store;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use cursor::Cursor;
pub use error::IndexerError;
pub use event::{DomainEvent, EventKind, EventMeta};
pub use indexer::{IndexerConfig, IndexerState};
pub use model::{
    Market, MarketResult, MarketStatus, Outcome, PositionRole, TxRecord, TxStatus, TxType,
    UserPosition, UserProfile, MARKET_CREATION_DEPOSIT,
};
pub use projection::{address_hex, hash_hex, ApplyOutcome, Projector};
pub use store::{ProjectionStore, ProjectionTx};
pub use types::{BlockRange, LogRecord};
