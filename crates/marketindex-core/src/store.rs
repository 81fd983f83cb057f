//! Storage seam for the projection engine.
//!
//! The engine never talks to a database directly. It opens a unit of work
//! with [`ProjectionStore::begin`], performs reads and writes through the
//! returned [`ProjectionTx`], and commits once the whole event has been
//! applied. Dropping a transaction without committing discards its writes.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::model::{Market, PositionRole, TxRecord, UserPosition, UserProfile};

/// A relational store holding the market projection.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Open a unit of work. One event is applied per unit.
    async fn begin(&self) -> Result<Box<dyn ProjectionTx>, IndexerError>;
}

/// An open unit of work against a [`ProjectionStore`].
#[async_trait]
pub trait ProjectionTx: Send {
    async fn find_market(&mut self, content_hash: &str) -> Result<Option<Market>, IndexerError>;

    async fn insert_market(&mut self, market: &Market) -> Result<(), IndexerError>;

    /// Persist the mutable columns of an existing market (status, result,
    /// pools, `resolved_at`).
    async fn update_market(&mut self, market: &Market) -> Result<(), IndexerError>;

    /// Append a ledger row.
    ///
    /// Returns `false` without writing when a row with the same `tx_hash`
    /// already exists.
    async fn insert_tx(&mut self, record: &TxRecord) -> Result<bool, IndexerError>;

    async fn find_tx(&mut self, tx_hash: &str) -> Result<Option<TxRecord>, IndexerError>;

    async fn find_position(
        &mut self,
        user_address: &str,
        content_hash: &str,
        role: PositionRole,
    ) -> Result<Option<UserPosition>, IndexerError>;

    /// Insert or overwrite the position keyed by `(user, market, role)`.
    async fn save_position(&mut self, position: &UserPosition) -> Result<(), IndexerError>;

    async fn find_profile(&mut self, user_address: &str) -> Result<Option<UserProfile>, IndexerError>;

    /// Insert or overwrite the profile keyed by `user_address`.
    async fn save_profile(&mut self, profile: &UserProfile) -> Result<(), IndexerError>;

    /// Make every write of this unit durable.
    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;
}

/// Convert an unsigned counter or block number to the signed 64-bit column
/// type used by SQL backends.
pub fn to_bigint(column: &str, value: u64) -> Result<i64, IndexerError> {
    i64::try_from(value)
        .map_err(|_| IndexerError::Storage(format!("{column} = {value} exceeds BIGINT range")))
}

/// Inverse of [`to_bigint`] for values read back from storage.
pub fn from_bigint(column: &str, value: i64) -> Result<u64, IndexerError> {
    u64::try_from(value)
        .map_err(|_| IndexerError::Storage(format!("{column} = {value} is negative")))
}

/// Token amounts span the full `u64` range (wei), so SQL backends persist
/// them as exact decimal text rather than `BIGINT`.
pub fn amount_to_decimal(value: u64) -> String {
    value.to_string()
}

/// Parse an amount column written by [`amount_to_decimal`].
pub fn amount_from_decimal(column: &str, value: &str) -> Result<u64, IndexerError> {
    value
        .trim()
        .parse()
        .map_err(|_| IndexerError::Storage(format!("{column} = {value:?} is not a u64 amount")))
}
