//! Error types for the marketindex pipeline.

use thiserror::Error;

/// Errors that can occur while syncing and projecting chain logs.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// An event references a market this indexer has never seen created.
    #[error("{event} references unknown market {content_hash}")]
    UnknownMarket {
        event: &'static str,
        content_hash: String,
    },

    #[error("Checkpoint for '{source_name}' cannot move backwards from {current} to {requested}")]
    CheckpointRegression {
        source_name: String,
        current: u64,
        requested: u64,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error came from the chain RPC boundary.
    ///
    /// These clear up on their own; everything else usually needs an operator.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_market_message() {
        let err = IndexerError::UnknownMarket {
            event: "BetPlaced",
            content_hash: "0xabc".into(),
        };
        assert_eq!(err.to_string(), "BetPlaced references unknown market 0xabc");
        assert!(!err.is_transient());
        assert!(IndexerError::Rpc("timeout".into()).is_transient());
    }
}
