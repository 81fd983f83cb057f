//! marketindex — command-line interface for the prediction-market indexer.
//!
//! # Commands
//! ```text
//! marketindex run                       follow the chain until Ctrl-C
//! marketindex sync-once                 process a single chunk and exit
//! marketindex checkpoint show           print the stored checkpoint
//! marketindex checkpoint set <block>    overwrite the checkpoint
//! marketindex decode-log --topics <..> --data <hex>
//! ```

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use marketindex_core::{
    CheckpointManager, CheckpointStore, IndexerConfig, LogRecord, ProjectionStore,
};
use marketindex_evm::{
    ChunkReport, Classified, EventDecoder, HttpRpcClient, IndexerBuilder, SyncLoop, TickOutcome,
};
use marketindex_storage::memory::InMemoryStorage;
use marketindex_storage::postgres::PostgresStorage;
use marketindex_storage::sqlite::SqliteStorage;

mod logging;

use logging::{init_tracing, LogConfig};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "marketindex",
    about = "Prediction-market chain indexer",
    long_about = "
Projects the event log of a prediction-market contract into relational tables
(markets, transactions, user_positions, user_profiles).

Every option can also be set from the environment or a .env file.
",
    version
)]
struct Cli {
    /// JSON-RPC endpoint of the chain node
    #[arg(long, env = "BLOCKCHAIN_RPC_URL", global = true, default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Address of the prediction-market contract
    #[arg(long, env = "CONTRACT_ADDRESS", global = true, default_value = "")]
    contract_address: String,

    /// `memory`, `sqlite:<path>`, or `postgres://...`
    #[arg(long, env = "DATABASE_URL", global = true, default_value = "memory")]
    database_url: String,

    /// Seconds between polls once caught up
    #[arg(long, env = "POLL_INTERVAL_SECS", global = true, default_value_t = 15)]
    poll_interval_secs: u64,

    /// First block to index when no checkpoint exists
    #[arg(long, env = "START_BLOCK", global = true, default_value_t = 1001)]
    start_block: u64,

    /// Maximum blocks per log query
    #[arg(long, env = "MAX_CHUNK", global = true, default_value_t = 1000)]
    max_chunk: u64,

    /// Blocks to stay behind the chain head
    #[arg(long, env = "CONFIRMATION_DEPTH", global = true, default_value_t = 0)]
    confirmation_depth: u64,

    /// Checkpoint key
    #[arg(long, env = "INDEXER_ID", global = true, default_value = "PredictionMarket")]
    indexer_id: String,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the chain, projecting events until interrupted
    Run,

    /// Process at most one chunk and print its report
    #[command(name = "sync-once")]
    SyncOnce {
        /// Keep going until the checkpoint reaches the head
        #[arg(long)]
        all: bool,
    },

    /// Inspect or override the stored checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Classify and decode a single raw log
    #[command(name = "decode-log")]
    DecodeLog {
        /// topics[0] = event signature hash, topics[1..] = indexed params
        #[arg(long, num_args = 1..)]
        topics: Vec<String>,
        /// Non-indexed params (hex, 0x-prefixed)
        #[arg(long, default_value = "0x")]
        data: String,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the last fully processed block
    Show,
    /// Overwrite the last processed block; the next run resumes at `block + 1`
    Set { block: u64 },
}

/// The two views of one storage backend.
struct Storage {
    projection: Arc<dyn ProjectionStore>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Storage {
    fn from_backend<S>(backend: S) -> Self
    where
        S: ProjectionStore + CheckpointStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            projection: backend.clone(),
            checkpoints: backend,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&LogConfig::new(cli.log_level.clone(), cli.log_json));

    match &cli.command {
        Commands::Run => cmd_run(&cli).await,
        Commands::SyncOnce { all } => cmd_sync_once(&cli, *all).await,
        Commands::Checkpoint { action } => cmd_checkpoint(&cli, action).await,
        Commands::DecodeLog { topics, data } => cmd_decode_log(topics, data),
    }
}

// ─── Setup ────────────────────────────────────────────────────────────────────

fn indexer_config(cli: &Cli) -> IndexerConfig {
    IndexerConfig {
        id: cli.indexer_id.clone(),
        contract_address: cli.contract_address.clone(),
        start_block: cli.start_block,
        max_chunk: cli.max_chunk,
        poll_interval_ms: cli.poll_interval_secs.saturating_mul(1000),
        confirmation_depth: cli.confirmation_depth,
    }
}

async fn open_storage(database_url: &str) -> Result<Storage> {
    if database_url == "memory" {
        tracing::warn!("using in-memory storage; nothing survives a restart");
        return Ok(Storage::from_backend(InMemoryStorage::new()));
    }
    if database_url.starts_with("sqlite:") {
        let db = SqliteStorage::open(database_url)
            .await
            .with_context(|| format!("opening SQLite database '{database_url}'"))?;
        return Ok(Storage::from_backend(db));
    }
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        let db = PostgresStorage::connect(database_url)
            .await
            .context("connecting to PostgreSQL")?;
        return Ok(Storage::from_backend(db));
    }
    Err(anyhow!(
        "unsupported DATABASE_URL '{database_url}' (expected memory, sqlite:..., or postgres://...)"
    ))
}

async fn sync_loop(cli: &Cli) -> Result<SyncLoop<HttpRpcClient>> {
    let storage = open_storage(&cli.database_url).await?;
    let client = HttpRpcClient::new(&cli.rpc_url, RPC_TIMEOUT)
        .with_context(|| format!("building RPC client for {}", cli.rpc_url))?;
    IndexerBuilder::from_config(indexer_config(cli))
        .build(client, storage.projection, storage.checkpoints)
        .context("invalid indexer configuration")
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_run(cli: &Cli) -> Result<()> {
    let mut sync = sync_loop(cli).await?;
    sync.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("interrupt received, shutting down");
    })
    .await
    .context("sync loop")?;
    Ok(())
}

async fn cmd_sync_once(cli: &Cli, all: bool) -> Result<()> {
    let mut sync = sync_loop(cli).await?;
    if all {
        for report in sync.catch_up().await.context("catching up")? {
            print_report(&report);
        }
    } else {
        match sync.tick().await.context("sync tick")? {
            TickOutcome::Idle { head } => {
                println!("{}", json!({ "idle": true, "head": head }));
            }
            TickOutcome::Chunk(report) => print_report(&report),
        }
    }
    let last = sync.checkpoint().last_block().await?;
    tracing::info!(checkpoint = last, state = %sync.state(), "sync-once finished");
    Ok(())
}

async fn cmd_checkpoint(cli: &Cli, action: &CheckpointAction) -> Result<()> {
    let storage = open_storage(&cli.database_url).await?;
    let config = indexer_config(cli);
    let manager = CheckpointManager::new(storage.checkpoints, &config.id, config.floor());

    match action {
        CheckpointAction::Show => match manager.load().await? {
            Some(cp) => println!(
                "{}",
                json!({
                    "indexer": cp.source_name,
                    "last_block": cp.last_block,
                    "updated_at": cp.updated_at,
                })
            ),
            None => println!(
                "{}",
                json!({
                    "indexer": manager.source_name(),
                    "last_block": null,
                    "resumes_after": config.floor(),
                })
            ),
        },
        CheckpointAction::Set { block } => {
            manager.force_set(*block).await?;
            println!("checkpoint for {} set to {block}", manager.source_name());
        }
    }
    Ok(())
}

fn cmd_decode_log(topics: &[String], data: &str) -> Result<()> {
    let topics = topics
        .iter()
        .map(|t| {
            t.parse::<B256>()
                .with_context(|| format!("topic '{t}' is not a 32-byte hex value"))
        })
        .collect::<Result<Vec<_>>>()?;
    let data: Bytes = data
        .parse()
        .with_context(|| format!("data '{data}' is not valid hex"))?;

    let log = LogRecord {
        address: Address::ZERO,
        topics,
        data,
        tx_hash: B256::ZERO,
        block_number: 0,
        log_index: 0,
    };

    let output = match EventDecoder::new().classify(&log) {
        Classified::Event(event) => json!({ "status": "event", "decoded": event }),
        Classified::Unrecognized => json!({ "status": "unrecognized" }),
        Classified::Malformed { kind, reason } => json!({
            "status": "malformed",
            "event": kind.name(),
            "reason": reason,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_report(report: &ChunkReport) {
    println!(
        "{}",
        json!({
            "from": report.range.from,
            "to": report.range.to,
            "logs": report.logs,
            "applied": report.applied,
            "already_applied": report.already_applied,
            "ignored": report.ignored,
            "unrecognized": report.unrecognized,
            "malformed": report.malformed,
            "caught_up": report.caught_up,
        })
    );
}
