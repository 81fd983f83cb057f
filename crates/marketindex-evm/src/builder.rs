//! Fluent builder API for creating a [`SyncLoop`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use marketindex_evm::{HttpRpcClient, IndexerBuilder};
//! use marketindex_storage::memory::InMemoryStorage;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(InMemoryStorage::new());
//! let client = HttpRpcClient::new("http://localhost:8545", Duration::from_secs(30))?;
//!
//! let mut sync = IndexerBuilder::new()
//!     .contract_address("0x5FbDB2315678afecb367f032d93F642f64180aa3")
//!     .start_block(1001)
//!     .max_chunk(500)
//!     .build(client, storage.clone(), storage)?;
//! sync.catch_up().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use alloy_primitives::Address;
use marketindex_core::checkpoint::CheckpointStore;
use marketindex_core::error::IndexerError;
use marketindex_core::indexer::IndexerConfig;
use marketindex_core::store::ProjectionStore;

use crate::fetcher::EvmRpcClient;
use crate::index_loop::SyncLoop;

/// Fluent builder for `IndexerConfig` and `SyncLoop`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the indexer ID (used as the checkpoint key).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the contract whose logs are indexed.
    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.config.contract_address = address.into();
        self
    }

    /// Set the first block to index when no checkpoint exists.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    /// Set the maximum number of blocks per `eth_getLogs` call.
    pub fn max_chunk(mut self, blocks: u64) -> Self {
        self.config.max_chunk = blocks;
        self
    }

    /// Set confirmation depth (blocks behind head before processing).
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    /// Set the polling interval once caught up, in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Validate and return the `IndexerConfig`.
    pub fn build_config(self) -> Result<IndexerConfig, IndexerError> {
        let c = &self.config;
        if c.id.trim().is_empty() {
            return Err(IndexerError::Config("indexer id must not be empty".into()));
        }
        if c.contract_address.parse::<Address>().is_err() {
            return Err(IndexerError::Config(format!(
                "invalid contract address '{}'",
                c.contract_address
            )));
        }
        if c.max_chunk == 0 {
            return Err(IndexerError::Config("max_chunk must be at least 1".into()));
        }
        if c.poll_interval_ms == 0 {
            return Err(IndexerError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(self.config)
    }

    /// Validate the configuration and assemble a [`SyncLoop`].
    pub fn build<C: EvmRpcClient>(
        self,
        client: C,
        projection: Arc<dyn ProjectionStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<SyncLoop<C>, IndexerError> {
        let config = self.build_config()?;
        Ok(SyncLoop::new(config, client, projection, checkpoints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new()
            .contract_address(CONTRACT)
            .build_config()
            .unwrap();
        assert_eq!(cfg.id, "PredictionMarket");
        assert_eq!(cfg.start_block, 1001);
        assert_eq!(cfg.max_chunk, 1000);
        assert_eq!(cfg.confirmation_depth, 0);
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .id("staging-market")
            .contract_address(CONTRACT)
            .start_block(50_000)
            .max_chunk(250)
            .confirmation_depth(6)
            .poll_interval_ms(2_000)
            .build_config()
            .unwrap();

        assert_eq!(cfg.id, "staging-market");
        assert_eq!(cfg.start_block, 50_000);
        assert_eq!(cfg.max_chunk, 250);
        assert_eq!(cfg.confirmation_depth, 6);
        assert_eq!(cfg.poll_interval_ms, 2_000);
    }

    #[test]
    fn builder_rejects_bad_config() {
        assert!(matches!(
            IndexerBuilder::new().build_config(),
            Err(IndexerError::Config(_))
        ));
        assert!(IndexerBuilder::new()
            .contract_address(CONTRACT)
            .max_chunk(0)
            .build_config()
            .is_err());
        assert!(IndexerBuilder::new()
            .contract_address(CONTRACT)
            .id("  ")
            .build_config()
            .is_err());
    }
}
