//! Typed domain events emitted by the prediction-market contract.
//!
//! The set is closed: the decoder produces exactly one of these per
//! recognised log, and the projection engine matches on it exhaustively.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::model::{MarketResult, Outcome};

/// The eight contract events the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MarketCreated,
    BetPlaced,
    MarketClosed,
    MarketResolved,
    BetClaimed,
    MarketCancelled,
    BetRefunded,
    DepositClaimed,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::MarketCreated,
        Self::BetPlaced,
        Self::MarketClosed,
        Self::MarketResolved,
        Self::BetClaimed,
        Self::MarketCancelled,
        Self::BetRefunded,
        Self::DepositClaimed,
    ];

    /// Canonical Solidity signature; its keccak256 is the log's `topics[0]`.
    pub fn signature(self) -> &'static str {
        match self {
            Self::MarketCreated => "MarketCreated(bytes32,uint256,address,address)",
            Self::BetPlaced => "BetPlaced(bytes32,address,bool,uint256,uint256,uint256)",
            Self::MarketClosed => "MarketClosed(bytes32)",
            Self::MarketResolved => "MarketResolved(bytes32,uint8,uint256,uint256)",
            Self::BetClaimed => "BetClaimed(bytes32,address,uint256)",
            Self::MarketCancelled => "MarketCancelled(bytes32)",
            Self::BetRefunded => "BetRefunded(bytes32,address,uint256)",
            Self::DepositClaimed => "DepositClaimed(bytes32,address,uint256)",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MarketCreated => "MarketCreated",
            Self::BetPlaced => "BetPlaced",
            Self::MarketClosed => "MarketClosed",
            Self::MarketResolved => "MarketResolved",
            Self::BetClaimed => "BetClaimed",
            Self::MarketCancelled => "MarketCancelled",
            Self::BetRefunded => "BetRefunded",
            Self::DepositClaimed => "DepositClaimed",
        }
    }

    /// Topics required, including the signature topic.
    pub fn required_topics(self) -> usize {
        match self {
            Self::MarketCreated => 4,
            Self::MarketClosed | Self::MarketResolved | Self::MarketCancelled => 2,
            Self::BetPlaced | Self::BetClaimed | Self::BetRefunded | Self::DepositClaimed => 3,
        }
    }

    /// 32-byte data words required.
    pub fn required_words(self) -> usize {
        match self {
            Self::MarketClosed | Self::MarketCancelled => 0,
            Self::MarketCreated
            | Self::BetClaimed
            | Self::BetRefunded
            | Self::DepositClaimed => 1,
            Self::MarketResolved => 3,
            Self::BetPlaced => 4,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    MarketCreated {
        content_hash: B256,
        creator: Address,
        group_owner: Address,
        deadline: u64,
    },
    BetPlaced {
        content_hash: B256,
        user: Address,
        outcome: Outcome,
        amount: u64,
        total_yes_pool: u64,
        total_no_pool: u64,
    },
    MarketClosed {
        content_hash: B256,
    },
    MarketResolved {
        content_hash: B256,
        result: MarketResult,
        total_yes_pool: u64,
        total_no_pool: u64,
    },
    BetClaimed {
        content_hash: B256,
        user: Address,
        amount: u64,
    },
    MarketCancelled {
        content_hash: B256,
    },
    BetRefunded {
        content_hash: B256,
        user: Address,
        amount: u64,
    },
    DepositClaimed {
        content_hash: B256,
        creator: Address,
        amount: u64,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MarketCreated { .. } => EventKind::MarketCreated,
            Self::BetPlaced { .. } => EventKind::BetPlaced,
            Self::MarketClosed { .. } => EventKind::MarketClosed,
            Self::MarketResolved { .. } => EventKind::MarketResolved,
            Self::BetClaimed { .. } => EventKind::BetClaimed,
            Self::MarketCancelled { .. } => EventKind::MarketCancelled,
            Self::BetRefunded { .. } => EventKind::BetRefunded,
            Self::DepositClaimed { .. } => EventKind::DepositClaimed,
        }
    }

    /// The market every event refers to.
    pub fn content_hash(&self) -> &B256 {
        match self {
            Self::MarketCreated { content_hash, .. }
            | Self::BetPlaced { content_hash, .. }
            | Self::MarketClosed { content_hash }
            | Self::MarketResolved { content_hash, .. }
            | Self::BetClaimed { content_hash, .. }
            | Self::MarketCancelled { content_hash }
            | Self::BetRefunded { content_hash, .. }
            | Self::DepositClaimed { content_hash, .. } => content_hash,
        }
    }
}

/// Where a decoded event came from on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u32,
    /// Wall-clock unix seconds at which the chunk was projected; used for
    /// `resolved_at` / `claimed_at`.
    pub observed_at: i64,
}
