//! In-memory storage backend.
//!
//! Keeps the latest snapshot per network and every reward row in RAM.
//! Useful for tests and for running the engine without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chainfeed_core::error::FeedError;
use chainfeed_core::store::PersistenceStore;
use chainfeed_core::types::{EraRewardRecord, Snapshot};

/// In-memory snapshot and reward storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    snapshots: Mutex<HashMap<String, Snapshot>>,
    snapshot_writes: Mutex<u64>,
    rewards: Mutex<Vec<(String, EraRewardRecord)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of networks with a stored snapshot.
    pub fn snapshot_count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    /// Total snapshot writes across all networks.
    pub fn snapshot_writes(&self) -> u64 {
        *lock(&self.snapshot_writes)
    }

    /// Reward rows stored for `network_id`, in insertion order.
    pub fn reward_rows(&self, network_id: &str) -> Vec<EraRewardRecord> {
        lock(&self.rewards)
            .iter()
            .filter(|(n, _)| n == network_id)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn write_snapshot(&self, network_id: &str, snapshot: &Snapshot) -> Result<(), FeedError> {
        lock(&self.snapshots).insert(network_id.to_string(), snapshot.clone());
        *lock(&self.snapshot_writes) += 1;
        Ok(())
    }

    async fn load_snapshot(&self, network_id: &str) -> Result<Option<Snapshot>, FeedError> {
        Ok(lock(&self.snapshots).get(network_id).cloned())
    }

    async fn insert_reward_rows(
        &self,
        rows: &[EraRewardRecord],
        era: u32,
        network_id: &str,
    ) -> Result<(), FeedError> {
        lock(&self.rewards).extend(rows.iter().map(|r| (network_id.to_string(), r.clone())));
        tracing::debug!(network = %network_id, era, rows = rows.len(), "reward rows stored");
        Ok(())
    }

    async fn rewards_exist_for_era(&self, network_id: &str, era: u32) -> Result<bool, FeedError> {
        Ok(lock(&self.rewards)
            .iter()
            .any(|(n, r)| n == network_id && r.era == era))
    }
}
