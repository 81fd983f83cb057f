//! Relational projection of on-chain market state.
//!
//! Every enum here is persisted as a small integer; the codes are part of the
//! schema shared with the read API and must not be renumbered.

use serde::{Deserialize, Serialize};

/// Deposit locked by the contract when a market is created (1 native token).
pub const MARKET_CREATION_DEPOSIT: u64 = 1_000_000_000_000_000_000;

/// Defines a `#[repr(i16)]` enum with `code()` / `from_code()` conversions.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident = $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(i16)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            /// The persisted integer code.
            pub fn code(self) -> i16 {
                self as i16
            }

            /// Parse a persisted integer code.
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

int_enum! {
    /// Lifecycle state of a market.
    pub enum MarketStatus {
        Open = 0,
        Closed = 1,
        Resolved = 2,
        Cancelled = 3,
    }
}

int_enum! {
    /// Winning side of a resolved market.
    pub enum MarketResult {
        Empty = 0,
        Yes = 1,
        No = 2,
    }
}

int_enum! {
    /// Side a bet was placed on.
    pub enum Outcome {
        Yes = 1,
        No = 2,
    }
}

int_enum! {
    /// Kind of ledger row.
    pub enum TxType {
        CreateMarket = 1,
        Bet = 2,
        Claim = 3,
        DepositRefund = 4,
        Refund = 5,
        ResolveMarket = 6,
        CancelMarket = 7,
    }
}

int_enum! {
    pub enum TxStatus {
        Failed = 0,
        Success = 1,
    }
}

int_enum! {
    /// Role a user holds in a market.
    pub enum PositionRole {
        Creator = 1,
        Bettor = 2,
    }
}

impl From<bool> for Outcome {
    /// The contract encodes the side as `betType`: `true` is Yes.
    fn from(yes: bool) -> Self {
        if yes {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }
}

impl MarketStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Resolved | Self::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether a market in `self` may move to `next`.
    ///
    /// Transitions only go forward along `Open → Closed → Resolved|Cancelled`.
    /// Re-applying the current state is allowed so replays stay harmless.
    pub fn can_transition_to(self, next: MarketStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Resolved => write!(f, "resolved"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A prediction market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// `0x`-prefixed 32-byte content hash (lowercase hex).
    pub content_hash: String,
    /// Market id assigned by the off-chain API; `None` until enriched.
    pub chain_id: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Unix seconds.
    pub deadline: i64,
    pub creator_address: String,
    pub group_owner_address: String,
    pub status: MarketStatus,
    pub result: MarketResult,
    pub total_yes_pool: u64,
    pub total_no_pool: u64,
    pub resolved_at: Option<i64>,
}

impl Market {
    /// A freshly created, not yet enriched market.
    pub fn open(
        content_hash: impl Into<String>,
        deadline: i64,
        creator_address: impl Into<String>,
        group_owner_address: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            chain_id: None,
            title: None,
            description: None,
            category: None,
            deadline,
            creator_address: creator_address.into(),
            group_owner_address: group_owner_address.into(),
            status: MarketStatus::Open,
            result: MarketResult::Empty,
            total_yes_pool: 0,
            total_no_pool: 0,
            resolved_at: None,
        }
    }
}

/// One row of the append-only transaction ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: String,
    pub content_hash: String,
    pub user_address: String,
    pub amount: u64,
    pub outcome: Option<Outcome>,
    pub tx_type: TxType,
    pub tx_status: TxStatus,
}

impl TxRecord {
    pub fn success(
        tx_type: TxType,
        tx_hash: impl Into<String>,
        content_hash: impl Into<String>,
        user_address: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            content_hash: content_hash.into(),
            user_address: user_address.into(),
            amount,
            outcome: None,
            tx_type,
            tx_status: TxStatus::Success,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// A user's stake and settlement state for one role in one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    pub user_address: String,
    pub content_hash: String,
    pub role: PositionRole,
    pub bet_outcome: Option<Outcome>,
    pub bet_amount: u64,
    pub deposit_amount: u64,
    pub has_claimed: bool,
    pub has_refunded: bool,
    /// Unix seconds; set on claim or refund.
    pub claimed_at: Option<i64>,
}

impl UserPosition {
    pub fn new(
        user_address: impl Into<String>,
        content_hash: impl Into<String>,
        role: PositionRole,
    ) -> Self {
        Self {
            user_address: user_address.into(),
            content_hash: content_hash.into(),
            role,
            bet_outcome: None,
            bet_amount: 0,
            deposit_amount: 0,
            has_claimed: false,
            has_refunded: false,
            claimed_at: None,
        }
    }

    /// Settled positions (claimed or refunded) are terminal.
    pub fn is_settled(&self) -> bool {
        self.has_claimed || self.has_refunded
    }
}

/// Aggregate betting statistics for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_address: String,
    pub total_bets: u64,
    pub win_bets: u64,
    pub total_pnl: i64,
    pub total_volume: u64,
}

impl UserProfile {
    pub fn new(user_address: impl Into<String>) -> Self {
        Self {
            user_address: user_address.into(),
            ..Default::default()
        }
    }

    /// Fold one claim into the aggregate.
    pub fn record_claim(&mut self, amount: u64) {
        self.total_bets += 1;
        if amount > 0 {
            self.win_bets += 1;
            self.total_pnl = self
                .total_pnl
                .saturating_add(i64::try_from(amount).unwrap_or(i64::MAX));
        }
        self.total_volume = self.total_volume.saturating_add(amount);
    }
}
