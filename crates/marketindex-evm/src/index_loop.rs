//! The sync loop — turns the contract's log stream into projected state.
//!
//! Each tick:
//!   1. Read the chain head and the checkpoint.
//!   2. Plan the next chunk `[last + 1, min(safe_head, last + max_chunk)]`.
//!   3. Fetch, classify and project every log of the chunk in chain order.
//!   4. Advance the checkpoint to the end of the chunk.
//!
//! Any error aborts the tick before step 4, so the same chunk is fetched
//! again on the next tick. While more than one chunk is outstanding the loop
//! ticks back-to-back; once caught up it sleeps for `poll_interval_ms`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use marketindex_core::checkpoint::{CheckpointManager, CheckpointStore};
use marketindex_core::cursor::Cursor;
use marketindex_core::error::IndexerError;
use marketindex_core::event::EventMeta;
use marketindex_core::indexer::{IndexerConfig, IndexerState};
use marketindex_core::projection::{ApplyOutcome, Projector};
use marketindex_core::store::ProjectionStore;
use marketindex_core::types::BlockRange;

use crate::decoder::{Classified, EventDecoder};
use crate::fetcher::{EvmFetcher, EvmRpcClient};

/// Counters for one processed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub range: BlockRange,
    /// Logs returned by the node (after dropping removed ones).
    pub logs: usize,
    pub applied: usize,
    pub already_applied: usize,
    pub ignored: usize,
    pub unrecognized: usize,
    pub malformed: usize,
    /// Whether the checkpoint reached the safe head with this chunk.
    pub caught_up: bool,
}

impl ChunkReport {
    fn new(range: BlockRange, logs: usize) -> Self {
        Self {
            range,
            logs,
            applied: 0,
            already_applied: 0,
            ignored: 0,
            unrecognized: 0,
            malformed: 0,
            caught_up: false,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The checkpoint is already at the safe head; nothing was fetched.
    Idle { head: u64 },
    /// One chunk was processed and the checkpoint advanced.
    Chunk(ChunkReport),
}

/// Drives fetch → decode → project → checkpoint for one contract.
pub struct SyncLoop<C: EvmRpcClient> {
    config: IndexerConfig,
    fetcher: EvmFetcher<C>,
    decoder: EventDecoder,
    projector: Projector,
    checkpoint: CheckpointManager,
    state: IndexerState,
}

impl<C: EvmRpcClient> SyncLoop<C> {
    pub fn new(
        config: IndexerConfig,
        client: C,
        projection: Arc<dyn ProjectionStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let checkpoint = CheckpointManager::new(checkpoints, &config.id, config.floor());
        Self {
            fetcher: EvmFetcher::new(client, &config.contract_address),
            decoder: EventDecoder::new(),
            projector: Projector::new(projection),
            checkpoint,
            state: IndexerState::Idle,
            config,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    /// Process at most one chunk.
    pub async fn tick(&mut self) -> Result<TickOutcome, IndexerError> {
        let head = self.fetcher.head_block_number().await?;
        let last = self.checkpoint.last_block().await?;
        let mut cursor = Cursor::new(last, self.config.confirmation_depth);

        let Some(range) = cursor.next_range(head, self.config.max_chunk) else {
            self.state = IndexerState::Live;
            tracing::trace!(head, last, "no new blocks");
            return Ok(TickOutcome::Idle { head });
        };

        let logs = self.fetcher.logs(range).await?;
        let observed_at = chrono::Utc::now().timestamp();
        let mut report = ChunkReport::new(range, logs.len());

        for log in &logs {
            match self.decoder.classify(log) {
                Classified::Unrecognized => {
                    report.unrecognized += 1;
                    tracing::debug!(
                        block = log.block_number,
                        log_index = log.log_index,
                        "skipping unrecognized log"
                    );
                }
                Classified::Malformed { kind, reason } => {
                    report.malformed += 1;
                    tracing::warn!(
                        event = %kind,
                        block = log.block_number,
                        log_index = log.log_index,
                        tx = %log.tx_hash,
                        %reason,
                        "dropping malformed log"
                    );
                }
                Classified::Event(event) => {
                    let meta = EventMeta {
                        tx_hash: log.tx_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        observed_at,
                    };
                    match self.projector.apply(&event, &meta).await? {
                        ApplyOutcome::Applied => report.applied += 1,
                        ApplyOutcome::AlreadyApplied => report.already_applied += 1,
                        ApplyOutcome::Ignored(_) => report.ignored += 1,
                    }
                }
            }
        }

        self.checkpoint.advance(range.to).await?;
        cursor.advance(range.to);
        report.caught_up = cursor.is_caught_up(head);
        self.state = if report.caught_up {
            IndexerState::Live
        } else {
            IndexerState::Backfilling
        };

        tracing::info!(
            %range,
            blocks = range.block_count(),
            head,
            logs = report.logs,
            applied = report.applied,
            skipped = report.unrecognized + report.malformed + report.ignored,
            state = %self.state,
            "chunk complete"
        );
        Ok(TickOutcome::Chunk(report))
    }

    /// Tick until the checkpoint reaches the safe head, returning every
    /// processed chunk. Stops at the first error.
    pub async fn catch_up(&mut self) -> Result<Vec<ChunkReport>, IndexerError> {
        let mut reports = Vec::new();
        loop {
            match self.tick().await? {
                TickOutcome::Idle { .. } => return Ok(reports),
                TickOutcome::Chunk(report) => {
                    let done = report.caught_up;
                    reports.push(report);
                    if done {
                        return Ok(reports);
                    }
                }
            }
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Tick failures are logged and retried on the next poll; they never end
    /// the loop.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), IndexerError>
    where
        F: Future<Output = ()>,
    {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let resume = self.checkpoint.last_block().await?;
        tracing::info!(
            id = %self.config.id,
            contract = %self.config.contract_address,
            resume_after = resume,
            poll_ms = self.config.poll_interval_ms,
            "sync loop starting"
        );

        tokio::pin!(shutdown);
        loop {
            let behind = match self.tick().await {
                Ok(TickOutcome::Chunk(report)) => !report.caught_up,
                Ok(TickOutcome::Idle { .. }) => false,
                Err(e) => {
                    self.state = IndexerState::Error;
                    tracing::error!(error = %e, transient = e.is_transient(), "sync tick failed");
                    false
                }
            };
            let delay = if behind { Duration::ZERO } else { poll_interval };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(id = %self.config.id, "sync loop stopping");
        self.state = IndexerState::Stopped;
        Ok(())
    }
}
