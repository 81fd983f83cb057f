//! Shared types for the indexing pipeline.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

// ─── LogRecord ────────────────────────────────────────────────────────────────

/// A single contract log, already parsed out of its RPC encoding.
///
/// `topics[0]` is the event signature hash; `topics[1..]` carry the indexed
/// fields. Non-indexed fields live in `data` as 32-byte big-endian words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Contract that emitted the log.
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: B256,
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u32,
}

impl LogRecord {
    /// The event signature hash, if the log has any topics at all.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }

    /// Number of complete 32-byte words in `data`.
    pub fn word_count(&self) -> usize {
        self.data.len() / 32
    }

    /// Ordering key matching the chain's canonical log order.
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive block range `[from, to]`: the unit of fetching and of
/// checkpoint advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered by the range.
    pub fn block_count(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn log(block: u64, index: u32, data_len: usize) -> LogRecord {
        LogRecord {
            address: Address::ZERO,
            topics: vec![B256::repeat_byte(0x11)],
            data: Bytes::from(vec![0u8; data_len]),
            tx_hash: B256::ZERO,
            block_number: block,
            log_index: index,
        }
    }

    #[test]
    fn word_count_ignores_trailing_partial_word() {
        assert_eq!(log(1, 0, 0).word_count(), 0);
        assert_eq!(log(1, 0, 64).word_count(), 2);
        assert_eq!(log(1, 0, 70).word_count(), 2);
    }

    #[test]
    fn position_orders_by_block_then_index() {
        let a = log(10, 5, 0);
        let b = log(11, 0, 0);
        let c = log(11, 2, 0);
        assert!(a.position() < b.position());
        assert!(b.position() < c.position());
    }

    #[test]
    fn block_range_count_and_display() {
        let r = BlockRange::new(1001, 2000);
        assert_eq!(r.block_count(), 1000);
        assert_eq!(BlockRange::new(7, 7).block_count(), 1);
        assert_eq!(r.to_string(), "[1001, 2000]");
    }
}
