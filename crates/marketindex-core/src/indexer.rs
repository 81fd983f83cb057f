//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used as the checkpoint key).
    pub id: String,
    /// Address of the prediction-market contract, `0x`-prefixed.
    pub contract_address: String,
    /// First block to index when no checkpoint exists yet.
    pub start_block: u64,
    /// Upper bound on the number of blocks requested per `eth_getLogs` call.
    pub max_chunk: u64,
    /// Block polling interval once caught up (milliseconds).
    pub poll_interval_ms: u64,
    /// Number of blocks to stay behind the chain head.
    pub confirmation_depth: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "PredictionMarket".into(),
            contract_address: String::new(),
            start_block: 1001,
            max_chunk: 1000,
            poll_interval_ms: 15_000,
            confirmation_depth: 0,
        }
    }
}

impl IndexerConfig {
    /// Block treated as already processed when no checkpoint exists.
    pub fn floor(&self) -> u64 {
        self.start_block.saturating_sub(1)
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Working through a backlog of more than one chunk.
    Backfilling,
    /// Following the chain tip.
    Live,
    /// Terminated.
    Stopped,
    /// The last tick failed; the next one retries the same chunk.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resume_below_start_block() {
        let config = IndexerConfig::default();
        assert_eq!(config.id, "PredictionMarket");
        assert_eq!(config.floor(), 1000);
        assert_eq!(config.max_chunk, 1000);
        assert_eq!(config.poll_interval_ms, 15_000);

        let genesis = IndexerConfig {
            start_block: 0,
            ..Default::default()
        };
        assert_eq!(genesis.floor(), 0);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: IndexerConfig =
            serde_json::from_str(r#"{"contract_address":"0xabc","max_chunk":50}"#).unwrap();
        assert_eq!(config.contract_address, "0xabc");
        assert_eq!(config.max_chunk, 50);
        assert_eq!(config.start_block, 1001);
    }
}
