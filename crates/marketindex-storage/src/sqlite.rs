//! SQLite storage backend.
//!
//! Persists the market projection and checkpoints to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! Token amounts are `TEXT` columns holding base-10 integers. SQLite integers
//! are signed 64-bit, and a `NUMERIC` column would turn larger values into
//! lossy `REAL`s.
//!
//! # Usage
//! ```rust,no_run
//! use marketindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./marketindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use marketindex_core::checkpoint::{Checkpoint, CheckpointStore};
use marketindex_core::error::IndexerError;
use marketindex_core::model::{
    Market, MarketResult, MarketStatus, Outcome, PositionRole, TxRecord, TxStatus, TxType,
    UserPosition, UserProfile,
};
use marketindex_core::store::{
    amount_from_decimal, amount_to_decimal, from_bigint, to_bigint, ProjectionStore, ProjectionTx,
};

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS indexer_state (
        contract_name TEXT    PRIMARY KEY,
        last_block    INTEGER NOT NULL,
        updated_at    INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS markets (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        chain_id            INTEGER UNIQUE,
        title               TEXT,
        description         TEXT,
        category            TEXT,
        content_hash        TEXT    NOT NULL UNIQUE,
        deadline            INTEGER NOT NULL,
        creator_address     TEXT    NOT NULL,
        group_owner_address TEXT    NOT NULL,
        status              INTEGER NOT NULL DEFAULT 0,
        result              INTEGER NOT NULL DEFAULT 0,
        total_yes_pool      TEXT    NOT NULL DEFAULT '0',
        total_no_pool       TEXT    NOT NULL DEFAULT '0',
        resolved_at         INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_markets_creator ON markets (creator_address)",
    "CREATE INDEX IF NOT EXISTS idx_markets_status ON markets (status)",
    "CREATE TABLE IF NOT EXISTS transactions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        tx_hash      TEXT    NOT NULL UNIQUE,
        content_hash TEXT    NOT NULL,
        user_address TEXT    NOT NULL,
        amount       TEXT    NOT NULL,
        outcome      INTEGER,
        tx_type      INTEGER NOT NULL,
        tx_status    INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_market ON transactions (content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (user_address)",
    "CREATE TABLE IF NOT EXISTS user_positions (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        user_address   TEXT    NOT NULL,
        content_hash   TEXT    NOT NULL,
        role           INTEGER NOT NULL,
        bet_outcome    INTEGER,
        bet_amount     TEXT    NOT NULL DEFAULT '0',
        deposit_amount TEXT    NOT NULL DEFAULT '0',
        has_claimed    BOOLEAN NOT NULL DEFAULT 0,
        has_refunded   BOOLEAN NOT NULL DEFAULT 0,
        claimed_at     INTEGER,
        UNIQUE (user_address, content_hash, role)
    )",
    "CREATE TABLE IF NOT EXISTS user_profiles (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_address TEXT    NOT NULL UNIQUE,
        total_bets   INTEGER NOT NULL DEFAULT 0,
        win_bets     INTEGER NOT NULL DEFAULT 0,
        total_pnl    INTEGER NOT NULL DEFAULT 0,
        total_volume TEXT    NOT NULL DEFAULT '0'
    )",
];

/// SQLite-backed storage for the projection and checkpoints.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./marketindex.db"`) or a full
    /// SQLite URL (`"sqlite:./marketindex.db"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(db_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // Every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and indexes if they don't exist yet.
    pub async fn init_schema(&self) -> Result<(), IndexerError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Look up a market outside of any projection transaction.
    pub async fn market(&self, content_hash: &str) -> Result<Option<Market>, IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_market(&mut conn, content_hash).await
    }

    /// Number of ledger rows.
    pub async fn transaction_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        from_bigint("cnt", row.try_get("cnt").map_err(db_err)?)
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn code<T>(column: &str, value: i64, parse: fn(i64) -> Option<T>) -> Result<T, IndexerError> {
    parse(value).ok_or_else(|| IndexerError::Storage(format!("{column}: unknown code {value}")))
}

fn amount(row: &SqliteRow, column: &str) -> Result<u64, IndexerError> {
    let text: String = row.try_get(column).map_err(db_err)?;
    amount_from_decimal(column, &text)
}

fn market_from_row(row: &SqliteRow) -> Result<Market, IndexerError> {
    let chain_id: Option<i64> = row.try_get("chain_id").map_err(db_err)?;
    Ok(Market {
        content_hash: row.try_get("content_hash").map_err(db_err)?,
        chain_id: chain_id.map(|id| from_bigint("chain_id", id)).transpose()?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        category: row.try_get("category").map_err(db_err)?,
        deadline: row.try_get("deadline").map_err(db_err)?,
        creator_address: row.try_get("creator_address").map_err(db_err)?,
        group_owner_address: row.try_get("group_owner_address").map_err(db_err)?,
        status: code("status", row.try_get("status").map_err(db_err)?, MarketStatus::from_code)?,
        result: code("result", row.try_get("result").map_err(db_err)?, MarketResult::from_code)?,
        total_yes_pool: amount(row, "total_yes_pool")?,
        total_no_pool: amount(row, "total_no_pool")?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
    })
}

fn position_from_row(row: &SqliteRow) -> Result<UserPosition, IndexerError> {
    let outcome: Option<i64> = row.try_get("bet_outcome").map_err(db_err)?;
    Ok(UserPosition {
        user_address: row.try_get("user_address").map_err(db_err)?,
        content_hash: row.try_get("content_hash").map_err(db_err)?,
        role: code("role", row.try_get("role").map_err(db_err)?, PositionRole::from_code)?,
        bet_outcome: outcome
            .map(|o| code("bet_outcome", o, Outcome::from_code))
            .transpose()?,
        bet_amount: amount(row, "bet_amount")?,
        deposit_amount: amount(row, "deposit_amount")?,
        has_claimed: row.try_get("has_claimed").map_err(db_err)?,
        has_refunded: row.try_get("has_refunded").map_err(db_err)?,
        claimed_at: row.try_get("claimed_at").map_err(db_err)?,
    })
}

fn profile_from_row(row: &SqliteRow) -> Result<UserProfile, IndexerError> {
    Ok(UserProfile {
        user_address: row.try_get("user_address").map_err(db_err)?,
        total_bets: from_bigint("total_bets", row.try_get("total_bets").map_err(db_err)?)?,
        win_bets: from_bigint("win_bets", row.try_get("win_bets").map_err(db_err)?)?,
        total_pnl: row.try_get("total_pnl").map_err(db_err)?,
        total_volume: amount(row, "total_volume")?,
    })
}

fn tx_from_row(row: &SqliteRow) -> Result<TxRecord, IndexerError> {
    let outcome: Option<i64> = row.try_get("outcome").map_err(db_err)?;
    Ok(TxRecord {
        tx_hash: row.try_get("tx_hash").map_err(db_err)?,
        content_hash: row.try_get("content_hash").map_err(db_err)?,
        user_address: row.try_get("user_address").map_err(db_err)?,
        amount: amount(row, "amount")?,
        outcome: outcome.map(|o| code("outcome", o, Outcome::from_code)).transpose()?,
        tx_type: code("tx_type", row.try_get("tx_type").map_err(db_err)?, TxType::from_code)?,
        tx_status: code(
            "tx_status",
            row.try_get("tx_status").map_err(db_err)?,
            TxStatus::from_code,
        )?,
    })
}

async fn select_market(
    conn: &mut sqlx::SqliteConnection,
    content_hash: &str,
) -> Result<Option<Market>, IndexerError> {
    let row = sqlx::query(
        "SELECT content_hash, chain_id, title, description, category, deadline,
                creator_address, group_owner_address, status, result,
                total_yes_pool, total_no_pool, resolved_at
         FROM markets WHERE content_hash = ?",
    )
    .bind(content_hash)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    row.as_ref().map(market_from_row).transpose()
}

// ─── ProjectionStore impl ────────────────────────────────────────────────────

/// A unit of work backed by a SQLite transaction.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ProjectionStore for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn ProjectionTx>, IndexerError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

#[async_trait]
impl ProjectionTx for SqliteTx {
    async fn find_market(&mut self, content_hash: &str) -> Result<Option<Market>, IndexerError> {
        select_market(&mut self.tx, content_hash).await
    }

    async fn insert_market(&mut self, market: &Market) -> Result<(), IndexerError> {
        let chain_id = market
            .chain_id
            .map(|id| to_bigint("chain_id", id))
            .transpose()?;
        sqlx::query(
            "INSERT INTO markets
             (content_hash, chain_id, title, description, category, deadline,
              creator_address, group_owner_address, status, result,
              total_yes_pool, total_no_pool, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&market.content_hash)
        .bind(chain_id)
        .bind(&market.title)
        .bind(&market.description)
        .bind(&market.category)
        .bind(market.deadline)
        .bind(&market.creator_address)
        .bind(&market.group_owner_address)
        .bind(market.status.code())
        .bind(market.result.code())
        .bind(amount_to_decimal(market.total_yes_pool))
        .bind(amount_to_decimal(market.total_no_pool))
        .bind(market.resolved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        debug!(market = %market.content_hash, "market inserted");
        Ok(())
    }

    async fn update_market(&mut self, market: &Market) -> Result<(), IndexerError> {
        sqlx::query(
            "UPDATE markets
             SET status = ?, result = ?, total_yes_pool = ?, total_no_pool = ?, resolved_at = ?
             WHERE content_hash = ?",
        )
        .bind(market.status.code())
        .bind(market.result.code())
        .bind(amount_to_decimal(market.total_yes_pool))
        .bind(amount_to_decimal(market.total_no_pool))
        .bind(market.resolved_at)
        .bind(&market.content_hash)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_tx(&mut self, record: &TxRecord) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT INTO transactions
             (tx_hash, content_hash, user_address, amount, outcome, tx_type, tx_status)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(&record.tx_hash)
        .bind(&record.content_hash)
        .bind(&record.user_address)
        .bind(amount_to_decimal(record.amount))
        .bind(record.outcome.map(Outcome::code))
        .bind(record.tx_type.code())
        .bind(record.tx_status.code())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_tx(&mut self, tx_hash: &str) -> Result<Option<TxRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT tx_hash, content_hash, user_address, amount, outcome, tx_type, tx_status
             FROM transactions WHERE tx_hash = ?",
        )
        .bind(tx_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(tx_from_row).transpose()
    }

    async fn find_position(
        &mut self,
        user_address: &str,
        content_hash: &str,
        role: PositionRole,
    ) -> Result<Option<UserPosition>, IndexerError> {
        let row = sqlx::query(
            "SELECT user_address, content_hash, role, bet_outcome, bet_amount, deposit_amount,
                    has_claimed, has_refunded, claimed_at
             FROM user_positions
             WHERE user_address = ? AND content_hash = ? AND role = ?",
        )
        .bind(user_address)
        .bind(content_hash)
        .bind(role.code())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn save_position(&mut self, position: &UserPosition) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO user_positions
             (user_address, content_hash, role, bet_outcome, bet_amount, deposit_amount,
              has_claimed, has_refunded, claimed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_address, content_hash, role) DO UPDATE SET
                bet_outcome    = excluded.bet_outcome,
                bet_amount     = excluded.bet_amount,
                deposit_amount = excluded.deposit_amount,
                has_claimed    = excluded.has_claimed,
                has_refunded   = excluded.has_refunded,
                claimed_at     = excluded.claimed_at",
        )
        .bind(&position.user_address)
        .bind(&position.content_hash)
        .bind(position.role.code())
        .bind(position.bet_outcome.map(Outcome::code))
        .bind(amount_to_decimal(position.bet_amount))
        .bind(amount_to_decimal(position.deposit_amount))
        .bind(position.has_claimed)
        .bind(position.has_refunded)
        .bind(position.claimed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_profile(&mut self, user_address: &str) -> Result<Option<UserProfile>, IndexerError> {
        let row = sqlx::query(
            "SELECT user_address, total_bets, win_bets, total_pnl, total_volume
             FROM user_profiles WHERE user_address = ?",
        )
        .bind(user_address)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn save_profile(&mut self, profile: &UserProfile) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO user_profiles
             (user_address, total_bets, win_bets, total_pnl, total_volume)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user_address) DO UPDATE SET
                total_bets   = excluded.total_bets,
                win_bets     = excluded.win_bets,
                total_pnl    = excluded.total_pnl,
                total_volume = excluded.total_volume",
        )
        .bind(&profile.user_address)
        .bind(to_bigint("total_bets", profile.total_bets)?)
        .bind(to_bigint("win_bets", profile.win_bets)?)
        .bind(profile.total_pnl)
        .bind(amount_to_decimal(profile.total_volume))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.commit().await.map_err(db_err)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self, source_name: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT contract_name, last_block, updated_at
             FROM indexer_state WHERE contract_name = ?",
        )
        .bind(source_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| -> Result<Checkpoint, IndexerError> {
            Ok(Checkpoint {
                source_name: r.try_get("contract_name").map_err(db_err)?,
                last_block: from_bigint("last_block", r.try_get("last_block").map_err(db_err)?)?,
                updated_at: r.try_get("updated_at").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_state (contract_name, last_block, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (contract_name) DO UPDATE SET
                last_block = excluded.last_block,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.source_name)
        .bind(to_bigint("last_block", checkpoint.last_block)?)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(
            source = %checkpoint.source_name,
            block = checkpoint.last_block,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, source_name: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM indexer_state WHERE contract_name = ?")
            .bind(source_name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
