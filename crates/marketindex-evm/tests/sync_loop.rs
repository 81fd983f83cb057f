//! End-to-end tests of the sync loop against a scripted chain and the
//! in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use marketindex_core::checkpoint::CheckpointStore;
use marketindex_core::error::IndexerError;
use marketindex_core::event::EventKind;
use marketindex_core::model::{MarketStatus, Outcome, PositionRole, TxType};
use marketindex_core::projection::{address_hex, hash_hex};
use marketindex_core::IndexerState;
use marketindex_evm::decoder::signature_hash;
use marketindex_evm::{EvmRpcClient, IndexerBuilder, RawLog, SyncLoop, TickOutcome};
use marketindex_storage::InMemoryStorage;

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const MARKET: B256 = B256::repeat_byte(0xaa);
const CREATOR: Address = Address::repeat_byte(0x11);
const OWNER: Address = Address::repeat_byte(0x22);
const BETTOR: Address = Address::repeat_byte(0x33);

// ─── Scripted chain ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Chain {
    head: u64,
    logs: Vec<RawLog>,
    fail_rpc: bool,
    requests: Vec<(u64, u64)>,
}

#[derive(Clone, Default)]
struct MockClient(Arc<Mutex<Chain>>);

impl MockClient {
    fn with_head(head: u64) -> Self {
        let client = Self::default();
        client.0.lock().unwrap().head = head;
        client
    }

    fn push(&self, log: RawLog) {
        self.0.lock().unwrap().logs.push(log);
    }

    fn requests(&self) -> Vec<(u64, u64)> {
        self.0.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl EvmRpcClient for MockClient {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let chain = self.0.lock().unwrap();
        if chain.fail_rpc {
            return Err(IndexerError::Rpc("connection refused".into()));
        }
        Ok(chain.head)
    }

    async fn get_logs(
        &self,
        address: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, IndexerError> {
        assert_eq!(address, CONTRACT);
        let mut chain = self.0.lock().unwrap();
        chain.requests.push((from, to));
        Ok(chain
            .logs
            .iter()
            .filter(|log| {
                let block = u64::from_str_radix(&log.block_number[2..], 16).unwrap();
                block >= from && block <= to
            })
            .cloned()
            .collect())
    }
}

// ─── Log fixtures ────────────────────────────────────────────────────────────

fn hex32(word: B256) -> String {
    format!("0x{}", hex::encode(word))
}

fn data(words: &[u64]) -> String {
    let mut out = String::from("0x");
    for w in words {
        out.push_str(&format!("{w:064x}"));
    }
    out
}

fn raw(topic0: B256, topics: &[B256], words: &[u64], block: u64, tx: u8) -> RawLog {
    let mut all = vec![hex32(topic0)];
    all.extend(topics.iter().copied().map(hex32));
    RawLog {
        address: CONTRACT.to_lowercase(),
        topics: all,
        data: data(words),
        block_number: format!("0x{block:x}"),
        block_hash: None,
        tx_hash: hex32(B256::repeat_byte(tx)),
        log_index: "0x0".into(),
        removed: None,
    }
}

fn created(block: u64, tx: u8) -> RawLog {
    raw(
        signature_hash(EventKind::MarketCreated),
        &[MARKET, CREATOR.into_word(), OWNER.into_word()],
        &[1_800_000_000],
        block,
        tx,
    )
}

fn bet(block: u64, tx: u8, words: &[u64]) -> RawLog {
    raw(
        signature_hash(EventKind::BetPlaced),
        &[MARKET, BETTOR.into_word()],
        words,
        block,
        tx,
    )
}

fn indexer(client: MockClient, storage: &Arc<InMemoryStorage>, start_block: u64) -> SyncLoop<MockClient> {
    IndexerBuilder::new()
        .contract_address(CONTRACT)
        .start_block(start_block)
        .poll_interval_ms(10)
        .build(client, storage.clone(), storage.clone())
        .unwrap()
}

async fn checkpoint(storage: &InMemoryStorage) -> Option<u64> {
    storage
        .load("PredictionMarket")
        .await
        .unwrap()
        .map(|cp| cp.last_block)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn backlog_is_processed_in_bounded_chunks() {
    let client = MockClient::with_head(3500);
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1);

    let reports = sync.catch_up().await.unwrap();
    let ranges: Vec<_> = reports.iter().map(|r| (r.range.from, r.range.to)).collect();
    assert_eq!(ranges, vec![(1, 1000), (1001, 2000), (2001, 3000), (3001, 3500)]);
    assert_eq!(client.requests(), ranges);
    assert!(reports.last().unwrap().caught_up);
    assert_eq!(checkpoint(&storage).await, Some(3500));
    assert_eq!(sync.state(), IndexerState::Live);

    assert_eq!(sync.tick().await.unwrap(), TickOutcome::Idle { head: 3500 });
}

#[tokio::test]
async fn first_run_starts_at_deployment_block() {
    let client = MockClient::with_head(1500);
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1001);

    sync.tick().await.unwrap();
    assert_eq!(client.requests(), vec![(1001, 1500)]);
    assert_eq!(checkpoint(&storage).await, Some(1500));
}

#[tokio::test]
async fn confirmation_depth_holds_back_the_head() {
    let client = MockClient::with_head(1010);
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = IndexerBuilder::new()
        .contract_address(CONTRACT)
        .confirmation_depth(5)
        .build(client.clone(), storage.clone(), storage.clone())
        .unwrap();

    sync.tick().await.unwrap();
    assert_eq!(client.requests(), vec![(1001, 1005)]);
}

#[tokio::test]
async fn bet_placed_updates_pools_ledger_and_position() {
    let client = MockClient::with_head(1100);
    client.push(created(1002, 1));
    client.push(bet(1003, 2, &[1, 500, 1500, 300]));
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client, &storage, 1001);

    let TickOutcome::Chunk(report) = sync.tick().await.unwrap() else {
        panic!("expected a chunk");
    };
    assert_eq!(report.applied, 2);

    let hash = hash_hex(&MARKET);
    let market = storage.market(&hash).await.unwrap();
    assert_eq!(market.status, MarketStatus::Open);
    assert_eq!(market.total_yes_pool, 1500);
    assert_eq!(market.total_no_pool, 300);

    let ledger = storage.transactions().await;
    assert_eq!(ledger.len(), 2);
    let bet_row = &ledger[1];
    assert_eq!(bet_row.tx_type, TxType::Bet);
    assert_eq!(bet_row.outcome, Some(Outcome::Yes));
    assert_eq!(bet_row.amount, 500);
    assert_eq!(bet_row.user_address, address_hex(&BETTOR));

    let position = storage
        .position(&address_hex(&BETTOR), &hash, PositionRole::Bettor)
        .await
        .unwrap();
    assert_eq!(position.bet_amount, 500);
    assert_eq!(checkpoint(&storage).await, Some(1100));
}

#[tokio::test]
async fn unknown_market_blocks_the_checkpoint() {
    let client = MockClient::with_head(1100);
    client.push(bet(1003, 2, &[1, 500, 500, 0]));
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1001);

    for _ in 0..2 {
        let err = sync.tick().await.unwrap_err();
        assert!(matches!(err, IndexerError::UnknownMarket { event: "BetPlaced", .. }));
        assert_eq!(checkpoint(&storage).await, None);
    }
    assert_eq!(client.requests(), vec![(1001, 1100), (1001, 1100)]);
    assert!(storage.transactions().await.is_empty());
}

#[tokio::test]
async fn redelivered_chunk_does_not_double_count() {
    let client = MockClient::with_head(1100);
    client.push(created(1002, 1));
    client.push(bet(1003, 2, &[1, 500, 500, 0]));
    // A bet on a market that was never created aborts the chunk after the
    // first two events have been applied.
    let mut orphan = bet(1004, 3, &[0, 100, 500, 100]);
    orphan.topics[1] = hex32(B256::repeat_byte(0xbb));
    client.push(orphan);

    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1001);
    assert!(sync.tick().await.is_err());
    assert_eq!(checkpoint(&storage).await, None);

    // Operator removes the offending log; the whole chunk is re-delivered.
    client.0.lock().unwrap().logs.pop();
    let TickOutcome::Chunk(report) = sync.tick().await.unwrap() else {
        panic!("expected a chunk");
    };
    assert_eq!(report.already_applied, 2);

    let position = storage
        .position(&address_hex(&BETTOR), &hash_hex(&MARKET), PositionRole::Bettor)
        .await
        .unwrap();
    assert_eq!(position.bet_amount, 500);
    assert_eq!(storage.transactions().await.len(), 2);
    assert_eq!(checkpoint(&storage).await, Some(1100));
}

#[tokio::test]
async fn second_bet_in_one_transaction_is_counted_as_ignored() {
    let client = MockClient::with_head(1100);
    client.push(created(1002, 1));
    client.push(bet(1003, 2, &[1, 500, 500, 0]));
    let mut batched = bet(1003, 2, &[1, 300, 800, 0]);
    batched.log_index = "0x1".into();
    client.push(batched);

    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client, &storage, 1001);
    let TickOutcome::Chunk(report) = sync.tick().await.unwrap() else {
        panic!("expected a chunk");
    };
    assert_eq!(report.applied, 2);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.already_applied, 0);

    let position = storage
        .position(&address_hex(&BETTOR), &hash_hex(&MARKET), PositionRole::Bettor)
        .await
        .unwrap();
    assert_eq!(position.bet_amount, 500);
    assert_eq!(checkpoint(&storage).await, Some(1100));
}

#[tokio::test]
async fn unrecognized_and_malformed_logs_are_skipped() {
    let client = MockClient::with_head(1100);
    client.push(raw(B256::repeat_byte(0x99), &[MARKET], &[1, 2], 1002, 1));
    client.push(bet(1003, 2, &[1, 500])); // truncated payload
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client, &storage, 1001);

    let TickOutcome::Chunk(report) = sync.tick().await.unwrap() else {
        panic!("expected a chunk");
    };
    assert_eq!(report.logs, 2);
    assert_eq!(report.unrecognized, 1);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.applied, 0);
    assert!(storage.markets().await.is_empty());
    assert_eq!(checkpoint(&storage).await, Some(1100));
}

#[tokio::test]
async fn market_created_twice_keeps_one_market() {
    let client = MockClient::with_head(1100);
    client.push(created(1002, 1));
    client.push(created(1005, 2));
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client, &storage, 1001);

    let TickOutcome::Chunk(report) = sync.tick().await.unwrap() else {
        panic!("expected a chunk");
    };
    assert_eq!(report.applied, 1);
    assert_eq!(report.already_applied, 1);
    assert_eq!(storage.markets().await.len(), 1);
    assert_eq!(storage.transactions().await.len(), 1);
}

#[tokio::test]
async fn rpc_failure_leaves_checkpoint_untouched() {
    let client = MockClient::with_head(1100);
    client.0.lock().unwrap().fail_rpc = true;
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1001);

    let err = sync.tick().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(checkpoint(&storage).await, None);

    client.0.lock().unwrap().fail_rpc = false;
    sync.tick().await.unwrap();
    assert_eq!(checkpoint(&storage).await, Some(1100));
}

#[tokio::test]
async fn run_catches_up_and_stops_on_shutdown() {
    let client = MockClient::with_head(2500);
    client.push(created(2400, 1));
    let storage = Arc::new(InMemoryStorage::new());
    let mut sync = indexer(client.clone(), &storage, 1);

    sync.run(tokio::time::sleep(Duration::from_millis(200)))
        .await
        .unwrap();

    assert_eq!(sync.state(), IndexerState::Stopped);
    assert_eq!(checkpoint(&storage).await, Some(2500));
    assert_eq!(storage.markets().await.len(), 1);
    assert_eq!(&client.requests()[..3], &[(1, 1000), (1001, 2000), (2001, 2500)]);
}
