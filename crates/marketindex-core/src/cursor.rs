//! Indexer cursor — tracks the last fully projected block and plans the next chunk.

use serde::{Deserialize, Serialize};

use crate::types::BlockRange;

/// The indexer's current position in the chain.
///
/// The cursor knows:
/// - Which block was last fully projected
/// - How far behind head a block must be before it is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Last block whose logs have all been applied.
    pub last_block: u64,
    /// Number of blocks to stay behind the chain head.
    pub confirmation_depth: u64,
}

impl Cursor {
    pub fn new(last_block: u64, confirmation_depth: u64) -> Self {
        Self {
            last_block,
            confirmation_depth,
        }
    }

    /// Advance the cursor after a chunk has been fully applied.
    pub fn advance(&mut self, to: u64) {
        self.last_block = to;
    }

    /// Highest block that may be processed given the current chain head.
    pub fn safe_head(&self, head: u64) -> u64 {
        head.saturating_sub(self.confirmation_depth)
    }

    /// Returns the next block to process (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.last_block + 1
    }

    /// Plan the next chunk: `[last+1, min(safe_head, last + max_chunk)]`.
    ///
    /// Returns `None` when there is nothing new to process.
    pub fn next_range(&self, head: u64, max_chunk: u64) -> Option<BlockRange> {
        let safe_head = self.safe_head(head);
        if safe_head <= self.last_block {
            return None;
        }
        let from = self.next_block();
        let to = safe_head.min(from + max_chunk.max(1) - 1);
        Some(BlockRange::new(from, to))
    }

    /// Returns `true` if the cursor has reached the safe head for `head`.
    pub fn is_caught_up(&self, head: u64) -> bool {
        self.last_block >= self.safe_head(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_when_head_not_ahead() {
        let cursor = Cursor::new(500, 0);
        assert_eq!(cursor.next_range(500, 1000), None);
        assert_eq!(cursor.next_range(400, 1000), None);
    }

    #[test]
    fn range_bounded_by_head() {
        let cursor = Cursor::new(500, 0);
        assert_eq!(cursor.next_range(510, 1000), Some(BlockRange::new(501, 510)));
    }

    #[test]
    fn range_bounded_by_max_chunk() {
        let cursor = Cursor::new(1000, 0);
        let range = cursor.next_range(4500, 1000).unwrap();
        assert_eq!(range, BlockRange::new(1001, 2000));
        assert_eq!(range.block_count(), 1000);
    }

    #[test]
    fn successive_chunks_cover_backlog() {
        let mut cursor = Cursor::new(0, 0);
        let mut ranges = vec![];
        while let Some(r) = cursor.next_range(3500, 1000) {
            ranges.push(r);
            cursor.advance(r.to);
        }
        assert_eq!(
            ranges,
            vec![
                BlockRange::new(1, 1000),
                BlockRange::new(1001, 2000),
                BlockRange::new(2001, 3000),
                BlockRange::new(3001, 3500),
            ]
        );
        assert!(cursor.is_caught_up(3500));
    }

    #[test]
    fn confirmation_depth_holds_back_head() {
        let cursor = Cursor::new(100, 12);
        assert_eq!(cursor.next_range(112, 1000), None); // safe head = 100
        assert_eq!(cursor.next_range(115, 1000), Some(BlockRange::new(101, 103)));
    }

    #[test]
    fn cursor_next_block() {
        let cursor = Cursor::new(500, 6);
        assert_eq!(cursor.next_block(), 501);
    }
}
