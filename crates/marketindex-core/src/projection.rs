//! Projection engine — applies decoded contract events to the relational store.
//!
//! Each event is applied inside its own unit of work, so a failing event
//! leaves no partial rows behind. Events are not grouped into a chunk-wide
//! transaction; chunk-level atomicity comes from the checkpoint only moving
//! after every event of the chunk has been applied.
//!
//! # Replay
//! A chunk that failed halfway is re-delivered in full on the next tick, so
//! every handler has to tolerate seeing an event twice:
//! - `MarketCreated` checks for an existing market first.
//! - Pool totals are overwritten with the absolute values carried by the
//!   event, never incremented.
//! - Ledger rows are keyed by `tx_hash`. When the row already exists the
//!   handler skips the counter updates tied to it (`bet_amount`, profile
//!   aggregates), which would otherwise be double counted.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use tracing::{debug, warn};

use crate::error::IndexerError;
use crate::event::{DomainEvent, EventKind, EventMeta};
use crate::model::{
    Market, MarketStatus, PositionRole, TxRecord, TxType, UserPosition, UserProfile,
    MARKET_CREATION_DEPOSIT,
};
use crate::store::{ProjectionStore, ProjectionTx};

/// Lowercase `0x`-prefixed hex of a 32-byte hash, as stored in the database.
pub fn hash_hex(hash: &B256) -> String {
    format!("0x{}", alloy_primitives::hex::encode(hash))
}

/// EIP-55 checksummed address, as stored in the database.
pub fn address_hex(address: &Address) -> String {
    address.to_checksum(None)
}

/// What applying a single event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed.
    Applied,
    /// The event had already been projected; nothing (or only overwrite-style
    /// fields) changed.
    AlreadyApplied,
    /// The event could not be applied and was skipped.
    Ignored(&'static str),
}

/// Applies [`DomainEvent`]s to a [`ProjectionStore`].
#[derive(Clone)]
pub struct Projector {
    store: Arc<dyn ProjectionStore>,
}

impl Projector {
    pub fn new(store: Arc<dyn ProjectionStore>) -> Self {
        Self { store }
    }

    /// Apply one event atomically.
    pub async fn apply(
        &self,
        event: &DomainEvent,
        meta: &EventMeta,
    ) -> Result<ApplyOutcome, IndexerError> {
        let mut tx = self.store.begin().await?;
        let outcome = apply_event(tx.as_mut(), event, meta).await?;
        tx.commit().await?;

        debug!(
            event = %event.kind(),
            block = meta.block_number,
            log_index = meta.log_index,
            ?outcome,
            "event projected"
        );
        Ok(outcome)
    }
}

async fn apply_event(
    tx: &mut dyn ProjectionTx,
    event: &DomainEvent,
    meta: &EventMeta,
) -> Result<ApplyOutcome, IndexerError> {
    let tx_hash = hash_hex(&meta.tx_hash);
    let now = meta.observed_at;

    match event {
        DomainEvent::MarketCreated {
            content_hash,
            creator,
            group_owner,
            deadline,
        } => {
            let hash = hash_hex(content_hash);
            if tx.find_market(&hash).await?.is_some() {
                return Ok(ApplyOutcome::AlreadyApplied);
            }
            let creator = address_hex(creator);
            let deadline = i64::try_from(*deadline).unwrap_or(i64::MAX);

            tx.insert_market(&Market::open(&hash, deadline, &creator, address_hex(group_owner)))
                .await?;
            tx.insert_tx(&TxRecord::success(
                TxType::CreateMarket,
                &tx_hash,
                &hash,
                &creator,
                MARKET_CREATION_DEPOSIT,
            ))
            .await?;

            let mut position = UserPosition::new(&creator, &hash, PositionRole::Creator);
            position.deposit_amount = MARKET_CREATION_DEPOSIT;
            tx.save_position(&position).await?;
            Ok(ApplyOutcome::Applied)
        }

        DomainEvent::BetPlaced {
            content_hash,
            user,
            outcome,
            amount,
            total_yes_pool,
            total_no_pool,
        } => {
            let hash = hash_hex(content_hash);
            let mut market = require_market(tx, EventKind::BetPlaced, &hash).await?;
            market.total_yes_pool = *total_yes_pool;
            market.total_no_pool = *total_no_pool;
            tx.update_market(&market).await?;

            let user = address_hex(user);
            let record =
                TxRecord::success(TxType::Bet, &tx_hash, &hash, &user, *amount).with_outcome(*outcome);
            if let Some(outcome) = append_ledger(tx, &record, EventKind::BetPlaced, meta).await? {
                return Ok(outcome);
            }

            let position = match tx.find_position(&user, &hash, PositionRole::Bettor).await? {
                Some(mut p) => {
                    p.bet_amount = p.bet_amount.saturating_add(*amount);
                    p.bet_outcome = Some(*outcome);
                    p
                }
                None => {
                    let mut p = UserPosition::new(&user, &hash, PositionRole::Bettor);
                    p.bet_amount = *amount;
                    p.bet_outcome = Some(*outcome);
                    p
                }
            };
            tx.save_position(&position).await?;
            Ok(ApplyOutcome::Applied)
        }

        DomainEvent::MarketClosed { content_hash } => {
            transition(tx, content_hash, MarketStatus::Closed, |_| {}).await
        }

        DomainEvent::MarketResolved {
            content_hash,
            result,
            total_yes_pool,
            total_no_pool,
        } => {
            transition(tx, content_hash, MarketStatus::Resolved, |m| {
                m.result = *result;
                m.total_yes_pool = *total_yes_pool;
                m.total_no_pool = *total_no_pool;
                m.resolved_at.get_or_insert(now);
            })
            .await
        }

        DomainEvent::MarketCancelled { content_hash } => {
            transition(tx, content_hash, MarketStatus::Cancelled, |m| {
                m.resolved_at.get_or_insert(now);
            })
            .await
        }

        DomainEvent::BetClaimed {
            content_hash,
            user,
            amount,
        } => {
            let hash = hash_hex(content_hash);
            require_market(tx, EventKind::BetClaimed, &hash).await?;
            let user = address_hex(user);

            let record = TxRecord::success(TxType::Claim, &tx_hash, &hash, &user, *amount);
            if let Some(outcome) = append_ledger(tx, &record, EventKind::BetClaimed, meta).await? {
                return Ok(outcome);
            }
            settle_position(tx, &user, &hash, PositionRole::Bettor, now, |p| {
                p.has_claimed = true
            })
            .await?;

            let mut profile = tx
                .find_profile(&user)
                .await?
                .unwrap_or_else(|| UserProfile::new(&user));
            profile.record_claim(*amount);
            tx.save_profile(&profile).await?;
            Ok(ApplyOutcome::Applied)
        }

        DomainEvent::BetRefunded {
            content_hash,
            user,
            amount,
        } => {
            let hash = hash_hex(content_hash);
            require_market(tx, EventKind::BetRefunded, &hash).await?;
            let user = address_hex(user);

            let record = TxRecord::success(TxType::Refund, &tx_hash, &hash, &user, *amount);
            if let Some(outcome) = append_ledger(tx, &record, EventKind::BetRefunded, meta).await? {
                return Ok(outcome);
            }
            settle_position(tx, &user, &hash, PositionRole::Bettor, now, |p| {
                p.has_refunded = true
            })
            .await?;
            Ok(ApplyOutcome::Applied)
        }

        DomainEvent::DepositClaimed {
            content_hash,
            creator,
            amount,
        } => {
            let hash = hash_hex(content_hash);
            let creator = address_hex(creator);

            let record =
                TxRecord::success(TxType::DepositRefund, &tx_hash, &hash, &creator, *amount);
            if let Some(outcome) = append_ledger(tx, &record, EventKind::DepositClaimed, meta).await? {
                return Ok(outcome);
            }
            settle_position(tx, &creator, &hash, PositionRole::Creator, now, |p| {
                p.has_claimed = true
            })
            .await?;
            Ok(ApplyOutcome::Applied)
        }
    }
}

/// Append the ledger row for an event.
///
/// `Some` carries the outcome to report when a row with the same `tx_hash`
/// already exists: a replay when the stored row is identical, a conflict
/// otherwise. Either way the event's counter updates must be skipped.
async fn append_ledger(
    tx: &mut dyn ProjectionTx,
    record: &TxRecord,
    kind: EventKind,
    meta: &EventMeta,
) -> Result<Option<ApplyOutcome>, IndexerError> {
    if tx.insert_tx(record).await? {
        return Ok(None);
    }
    match tx.find_tx(&record.tx_hash).await? {
        Some(stored) if stored == *record => {
            debug!(
                event = %kind,
                tx_hash = %record.tx_hash,
                log_index = meta.log_index,
                "ledger row present, event already applied"
            );
            Ok(Some(ApplyOutcome::AlreadyApplied))
        }
        stored => {
            warn!(
                event = %kind,
                tx_hash = %record.tx_hash,
                block = meta.block_number,
                log_index = meta.log_index,
                stored_type = ?stored.as_ref().map(|r| r.tx_type),
                stored_user = ?stored.as_ref().map(|r| r.user_address.as_str()),
                "transaction already has a different ledger row; event effects skipped"
            );
            Ok(Some(ApplyOutcome::Ignored("ledger conflict")))
        }
    }
}

async fn require_market(
    tx: &mut dyn ProjectionTx,
    event: EventKind,
    content_hash: &str,
) -> Result<Market, IndexerError> {
    tx.find_market(content_hash)
        .await?
        .ok_or_else(|| IndexerError::UnknownMarket {
            event: event.name(),
            content_hash: content_hash.to_string(),
        })
}

/// Move a market to `next`, applying `update` to the row first.
async fn transition<F>(
    tx: &mut dyn ProjectionTx,
    content_hash: &B256,
    next: MarketStatus,
    update: F,
) -> Result<ApplyOutcome, IndexerError>
where
    F: FnOnce(&mut Market) + Send,
{
    let hash = hash_hex(content_hash);
    let Some(mut market) = tx.find_market(&hash).await? else {
        warn!(market = %hash, status = %next, "status change for unknown market");
        return Ok(ApplyOutcome::Ignored("unknown market"));
    };
    if !market.status.can_transition_to(next) {
        warn!(
            market = %hash,
            from = %market.status,
            to = %next,
            "refusing backwards status transition"
        );
        return Ok(ApplyOutcome::Ignored("status regression"));
    }

    market.status = next;
    update(&mut market);
    tx.update_market(&market).await?;
    Ok(ApplyOutcome::Applied)
}

/// Mark a position settled; a missing position is logged and tolerated.
async fn settle_position<F>(
    tx: &mut dyn ProjectionTx,
    user: &str,
    content_hash: &str,
    role: PositionRole,
    now: i64,
    mark: F,
) -> Result<(), IndexerError>
where
    F: FnOnce(&mut UserPosition) + Send,
{
    match tx.find_position(user, content_hash, role).await? {
        Some(mut position) => {
            mark(&mut position);
            position.claimed_at = Some(now);
            tx.save_position(&position).await
        }
        None => {
            warn!(market = %content_hash, user = %user, ?role, "settlement for missing position");
            Ok(())
        }
    }
}
