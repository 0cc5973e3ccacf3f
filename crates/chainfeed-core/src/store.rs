//! Persistence contract used by the engine and the rewards backfill.
//!
//! Implementations live in `chainfeed-storage` (`InMemoryStore`,
//! `SqliteStore`).

use async_trait::async_trait;

use crate::error::FeedError;
use crate::types::{EraRewardRecord, Snapshot};

/// Storage for the per-network snapshot and historical reward rows.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Overwrite the network's snapshot. Re-delivery of the same snapshot is
    /// harmless.
    async fn write_snapshot(&self, network_id: &str, snapshot: &Snapshot) -> Result<(), FeedError>;

    /// Load the network's current snapshot.
    async fn load_snapshot(&self, network_id: &str) -> Result<Option<Snapshot>, FeedError>;

    /// Append reward rows produced by a backfill of `era`.
    async fn insert_reward_rows(
        &self,
        rows: &[EraRewardRecord],
        era: u32,
        network_id: &str,
    ) -> Result<(), FeedError>;

    /// Whether any reward row for `era` is already stored.
    async fn rewards_exist_for_era(&self, network_id: &str, era: u32) -> Result<bool, FeedError>;
}
