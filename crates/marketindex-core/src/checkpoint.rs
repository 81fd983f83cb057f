//! Checkpoint manager — persists the indexer's position for crash recovery.
//!
//! A checkpoint stores the last block whose logs have all been projected.
//! On restart the indexer resumes from `last_block + 1`; when no checkpoint
//! exists yet it starts from the configured deployment-block floor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A persisted checkpoint, one per indexed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Name of the indexed source (e.g. `"PredictionMarket"`).
    pub source_name: String,
    /// Last fully processed block number.
    pub last_block: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include `MemoryCheckpointStore`, `InMemoryStorage`,
/// `SqliteStorage`, and `PostgresStorage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a source.
    async fn load(&self, source_name: &str) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, source_name: &str) -> Result<(), IndexerError>;
}

/// Manages checkpoint reads/writes for one source.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    source_name: String,
    /// Block treated as already processed when no checkpoint exists.
    floor: u64,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, source_name: impl Into<String>, floor: u64) -> Self {
        Self {
            store,
            source_name: source_name.into(),
            floor,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(&self.source_name).await
    }

    /// The last processed block: the checkpoint if present, else the floor.
    pub async fn last_block(&self) -> Result<u64, IndexerError> {
        Ok(self
            .load()
            .await?
            .map(|cp| cp.last_block)
            .unwrap_or(self.floor))
    }

    /// Record that every log up to and including `to` has been applied.
    ///
    /// Refuses to move the checkpoint backwards.
    pub async fn advance(&self, to: u64) -> Result<(), IndexerError> {
        if let Some(current) = self.load().await? {
            if to < current.last_block {
                return Err(IndexerError::CheckpointRegression {
                    source_name: self.source_name.clone(),
                    current: current.last_block,
                    requested: to,
                });
            }
        }
        self.write(to).await
    }

    /// Overwrite the checkpoint unconditionally (operator skip / rewind).
    pub async fn force_set(&self, block: u64) -> Result<(), IndexerError> {
        tracing::warn!(source = %self.source_name, block, "checkpoint force-set");
        self.write(block).await
    }

    /// Remove the checkpoint so the next run starts from the floor again.
    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.store.delete(&self.source_name).await
    }

    async fn write(&self, block: u64) -> Result<(), IndexerError> {
        let cp = Checkpoint {
            source_name: self.source_name.clone(),
            last_block: block,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, source_name: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(source_name).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(checkpoint.source_name.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, source_name: &str) -> Result<(), IndexerError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.remove(source_name);
        Ok(())
    }
}
