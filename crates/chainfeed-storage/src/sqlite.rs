//! SQLite storage backend for ChainFeed.
//!
//! One row per network in `snapshots` (upserted on every processed block)
//! and an append-only `rewards` table filled by the era backfill.
//!
//! # Usage
//! ```rust,no_run
//! use chainfeed_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./feed.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainfeed_core::error::FeedError;
use chainfeed_core::store::PersistenceStore;
use chainfeed_core::types::{Amount, EraRewardRecord, Snapshot};

fn storage_err(e: impl std::fmt::Display) -> FeedError {
    FeedError::Storage(e.to_string())
}

/// SQLite-backed snapshot and reward storage.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./feed.db"`) or a full
    /// SQLite URL (`"sqlite:./feed.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, FeedError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Limited to one pooled connection: every connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, FeedError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), FeedError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                network_id      TEXT    NOT NULL PRIMARY KEY,
                height          INTEGER NOT NULL,
                block_json      TEXT    NOT NULL,
                validators_json TEXT,
                era             INTEGER,
                updated_at      INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rewards (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                network_id TEXT    NOT NULL,
                era        INTEGER NOT NULL,
                amount     TEXT    NOT NULL,
                height     INTEGER NOT NULL,
                validator  TEXT    NOT NULL,
                denom      TEXT    NOT NULL,
                address    TEXT    NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rewards_era ON rewards (network_id, era);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    /// Reward rows for one era, in insertion order.
    pub async fn reward_rows(&self, network_id: &str, era: u32) -> Result<Vec<EraRewardRecord>, FeedError> {
        let rows = sqlx::query(
            "SELECT amount, height, validator, denom, address, era
             FROM rewards WHERE network_id = ? AND era = ? ORDER BY id",
        )
        .bind(network_id)
        .bind(era as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter()
            .map(|r| {
                let amount: String = r.get("amount");
                Ok(EraRewardRecord {
                    amount: amount.parse::<Amount>().map_err(storage_err)?,
                    height: r.get::<i64, _>("height") as u64,
                    validator: r.get("validator"),
                    denom: r.get("denom"),
                    address: r.get("address"),
                    era: r.get::<i64, _>("era") as u32,
                })
            })
            .collect()
    }

    /// Total number of stored reward rows for `network_id`.
    pub async fn reward_count(&self, network_id: &str) -> Result<u64, FeedError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM rewards WHERE network_id = ?")
            .bind(network_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── PersistenceStore impl ───────────────────────────────────────────────────

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn write_snapshot(&self, network_id: &str, snapshot: &Snapshot) -> Result<(), FeedError> {
        let block_json = serde_json::to_string(&snapshot.block)?;
        let validators_json = snapshot
            .validator_set
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT OR REPLACE INTO snapshots
             (network_id, height, block_json, validators_json, era, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(network_id)
        .bind(snapshot.height as i64)
        .bind(&block_json)
        .bind(validators_json)
        .bind(snapshot.era.map(i64::from))
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(network = %network_id, height = snapshot.height, "snapshot saved");
        Ok(())
    }

    async fn load_snapshot(&self, network_id: &str) -> Result<Option<Snapshot>, FeedError> {
        let row = sqlx::query(
            "SELECT height, block_json, validators_json, era, updated_at
             FROM snapshots WHERE network_id = ?",
        )
        .bind(network_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(r) = row else { return Ok(None) };

        let block_json: String = r.get("block_json");
        let validators_json: Option<String> = r.get("validators_json");
        Ok(Some(Snapshot {
            height: r.get::<i64, _>("height") as u64,
            block: serde_json::from_str(&block_json)?,
            validator_set: validators_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            era: r.get::<Option<i64>, _>("era").map(|e| e as u32),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn insert_reward_rows(
        &self,
        rows: &[EraRewardRecord],
        era: u32,
        network_id: &str,
    ) -> Result<(), FeedError> {
        let created_at = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        for row in rows {
            sqlx::query(
                "INSERT INTO rewards
                 (network_id, era, amount, height, validator, denom, address, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(network_id)
            .bind(row.era as i64)
            .bind(row.amount.to_string())
            .bind(row.height as i64)
            .bind(&row.validator)
            .bind(&row.denom)
            .bind(&row.address)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(network = %network_id, era, rows = rows.len(), "reward rows stored");
        Ok(())
    }

    async fn rewards_exist_for_era(&self, network_id: &str, era: u32) -> Result<bool, FeedError> {
        let row = sqlx::query("SELECT 1 FROM rewards WHERE network_id = ? AND era = ? LIMIT 1")
            .bind(network_id)
            .bind(era as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
