//! marketindex-evm — EVM log source, event decoder, and sync loop.

pub mod builder;
pub mod decoder;
pub mod fetcher;
pub mod index_loop;
pub mod rpc;

pub use builder::IndexerBuilder;
pub use decoder::{Classified, EventDecoder};
pub use fetcher::{EvmFetcher, EvmRpcClient, RawLog};
pub use index_loop::{ChunkReport, SyncLoop, TickOutcome};
pub use rpc::{HttpRpcClient, TransportError};
