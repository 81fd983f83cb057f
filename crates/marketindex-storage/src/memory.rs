//! In-memory storage backend.
//!
//! Stores the market projection and checkpoints in RAM.
//! Useful for testing and short-lived indexers that don't need persistence.
//!
//! A projection transaction holds the table lock for its whole lifetime, so
//! units of work are serialized. Writes go straight to the tables and record
//! an undo entry; dropping the transaction without committing replays the
//! undo log in reverse.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use marketindex_core::checkpoint::{Checkpoint, CheckpointStore};
use marketindex_core::error::IndexerError;
use marketindex_core::model::{Market, PositionRole, TxRecord, UserPosition, UserProfile};
use marketindex_core::store::{ProjectionStore, ProjectionTx};

type PositionKey = (String, String, PositionRole);

#[derive(Debug, Default)]
struct Tables {
    markets: BTreeMap<String, Market>,
    /// Ledger rows in insertion order.
    transactions: Vec<TxRecord>,
    tx_hashes: HashSet<String>,
    positions: BTreeMap<PositionKey, UserPosition>,
    profiles: BTreeMap<String, UserProfile>,
}

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    tables: Arc<AsyncMutex<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn market(&self, content_hash: &str) -> Option<Market> {
        self.tables.lock().await.markets.get(content_hash).cloned()
    }

    /// All markets ordered by content hash.
    pub async fn markets(&self) -> Vec<Market> {
        self.tables.lock().await.markets.values().cloned().collect()
    }

    /// The ledger in insertion order.
    pub async fn transactions(&self) -> Vec<TxRecord> {
        self.tables.lock().await.transactions.clone()
    }

    pub async fn position(
        &self,
        user_address: &str,
        content_hash: &str,
        role: PositionRole,
    ) -> Option<UserPosition> {
        let key = (user_address.to_string(), content_hash.to_string(), role);
        self.tables.lock().await.positions.get(&key).cloned()
    }

    pub async fn positions(&self) -> Vec<UserPosition> {
        self.tables.lock().await.positions.values().cloned().collect()
    }

    pub async fn profile(&self, user_address: &str) -> Option<UserProfile> {
        self.tables.lock().await.profiles.get(user_address).cloned()
    }
}

/// Inverse of one write, applied when a transaction is rolled back.
#[derive(Debug)]
enum Undo {
    MarketInserted(String),
    MarketUpdated(Market),
    TxInserted(String),
    PositionSaved(PositionKey, Option<UserPosition>),
    ProfileSaved(String, Option<UserProfile>),
}

impl Undo {
    fn revert(self, tables: &mut Tables) {
        match self {
            Undo::MarketInserted(hash) => {
                tables.markets.remove(&hash);
            }
            Undo::MarketUpdated(previous) => {
                tables.markets.insert(previous.content_hash.clone(), previous);
            }
            Undo::TxInserted(hash) => {
                tables.tx_hashes.remove(&hash);
                tables.transactions.pop();
            }
            Undo::PositionSaved(key, Some(previous)) => {
                tables.positions.insert(key, previous);
            }
            Undo::PositionSaved(key, None) => {
                tables.positions.remove(&key);
            }
            Undo::ProfileSaved(user, Some(previous)) => {
                tables.profiles.insert(user, previous);
            }
            Undo::ProfileSaved(user, None) => {
                tables.profiles.remove(&user);
            }
        }
    }
}

/// A unit of work over [`InMemoryStorage`].
pub struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        while let Some(entry) = self.undo.pop() {
            entry.revert(&mut self.tables);
        }
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn ProjectionTx>, IndexerError> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            tables,
            undo: Vec::new(),
        }))
    }
}

#[async_trait]
impl ProjectionTx for MemoryTx {
    async fn find_market(&mut self, content_hash: &str) -> Result<Option<Market>, IndexerError> {
        Ok(self.tables.markets.get(content_hash).cloned())
    }

    async fn insert_market(&mut self, market: &Market) -> Result<(), IndexerError> {
        if self.tables.markets.contains_key(&market.content_hash) {
            return Err(IndexerError::Storage(format!(
                "duplicate market {}",
                market.content_hash
            )));
        }
        self.tables
            .markets
            .insert(market.content_hash.clone(), market.clone());
        self.undo
            .push(Undo::MarketInserted(market.content_hash.clone()));
        Ok(())
    }

    async fn update_market(&mut self, market: &Market) -> Result<(), IndexerError> {
        let Some(row) = self.tables.markets.get_mut(&market.content_hash) else {
            return Err(IndexerError::Storage(format!(
                "update of missing market {}",
                market.content_hash
            )));
        };
        let previous = row.clone();
        row.status = market.status;
        row.result = market.result;
        row.total_yes_pool = market.total_yes_pool;
        row.total_no_pool = market.total_no_pool;
        row.resolved_at = market.resolved_at;
        self.undo.push(Undo::MarketUpdated(previous));
        Ok(())
    }

    async fn insert_tx(&mut self, record: &TxRecord) -> Result<bool, IndexerError> {
        if !self.tables.tx_hashes.insert(record.tx_hash.clone()) {
            return Ok(false);
        }
        self.tables.transactions.push(record.clone());
        self.undo.push(Undo::TxInserted(record.tx_hash.clone()));
        Ok(true)
    }

    async fn find_tx(&mut self, tx_hash: &str) -> Result<Option<TxRecord>, IndexerError> {
        if !self.tables.tx_hashes.contains(tx_hash) {
            return Ok(None);
        }
        Ok(self
            .tables
            .transactions
            .iter()
            .rev()
            .find(|r| r.tx_hash == tx_hash)
            .cloned())
    }

    async fn find_position(
        &mut self,
        user_address: &str,
        content_hash: &str,
        role: PositionRole,
    ) -> Result<Option<UserPosition>, IndexerError> {
        let key = (user_address.to_string(), content_hash.to_string(), role);
        Ok(self.tables.positions.get(&key).cloned())
    }

    async fn save_position(&mut self, position: &UserPosition) -> Result<(), IndexerError> {
        let key = (
            position.user_address.clone(),
            position.content_hash.clone(),
            position.role,
        );
        let previous = self.tables.positions.insert(key.clone(), position.clone());
        self.undo.push(Undo::PositionSaved(key, previous));
        Ok(())
    }

    async fn find_profile(&mut self, user_address: &str) -> Result<Option<UserProfile>, IndexerError> {
        Ok(self.tables.profiles.get(user_address).cloned())
    }

    async fn save_profile(&mut self, profile: &UserProfile) -> Result<(), IndexerError> {
        let previous = self
            .tables
            .profiles
            .insert(profile.user_address.clone(), profile.clone());
        self.undo
            .push(Undo::ProfileSaved(profile.user_address.clone(), previous));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let mut this = self;
        this.undo.clear();
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self, source_name: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let data = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(source_name).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let mut data = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(checkpoint.source_name.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, source_name: &str) -> Result<(), IndexerError> {
        let mut data = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        data.remove(source_name);
        Ok(())
    }
}
