//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backfill::BackfillTrigger;
use crate::client::{ChainClient, Connector, HeadSubscription};
use crate::error::FeedError;
use crate::fault::{FaultReporter, FaultScope};
use crate::publisher::{EventPublisher, EventType, ResourceType};
use crate::store::PersistenceStore;
use crate::types::{
    Amount, Block, EraRewardRecord, RawReward, Snapshot, Transaction, TxDetails, Validator,
    ValidatorSet,
};

// ─── Chain ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ChainInner {
    head: u64,
    default_session: u64,
    sessions: HashMap<u64, u64>,
    era: u32,
    era_queue: VecDeque<u32>,
    failing_blocks: HashSet<u64>,
    failing_height_queries: u32,
    failing_validator_refreshes: u32,
    block_delays: HashMap<u64, Duration>,
    era_read_delays: VecDeque<Duration>,
    validator_delays: VecDeque<Duration>,
    transactions: HashMap<u64, Vec<Transaction>>,
    rewards: Vec<RawReward>,
    last_session_fetched: u64,
    log: Vec<String>,
    head_senders: Vec<mpsc::Sender<u64>>,
    height_queries: u32,
    block_fetches: Vec<u64>,
    validator_refreshes: Vec<u64>,
    era_reads: u32,
    disconnects: u32,
}

/// A scripted ledger shared by every client handle a [`MockConnector`] opens.
#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<ChainInner>>,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self::default();
        chain.inner.lock().unwrap().default_session = 1;
        chain
    }

    pub fn set_head(&self, height: u64) {
        self.inner.lock().unwrap().head = height;
    }

    pub fn set_session(&self, height: u64, session_index: u64) {
        self.inner.lock().unwrap().sessions.insert(height, session_index);
    }

    pub fn set_era(&self, era: u32) {
        self.inner.lock().unwrap().era = era;
    }

    /// Answer successive era reads with `eras`, then stick to the last value.
    pub fn queue_eras(&self, eras: &[u32]) {
        self.inner.lock().unwrap().era_queue.extend(eras.iter().copied());
    }

    pub fn fail_block(&self, height: u64) {
        self.inner.lock().unwrap().failing_blocks.insert(height);
    }

    pub fn fail_height_queries(&self, count: u32) {
        self.inner.lock().unwrap().failing_height_queries = count;
    }

    pub fn fail_validator_refreshes(&self, count: u32) {
        self.inner.lock().unwrap().failing_validator_refreshes = count;
    }

    pub fn delay_block(&self, height: u64, delay: Duration) {
        self.inner.lock().unwrap().block_delays.insert(height, delay);
    }

    /// Delay the next era reads, one entry per call.
    pub fn delay_era_reads(&self, delays: &[Duration]) {
        self.inner.lock().unwrap().era_read_delays.extend(delays.iter().copied());
    }

    /// Delay the next validator-set fetches, one entry per call.
    pub fn delay_validator_refreshes(&self, delays: &[Duration]) {
        self.inner.lock().unwrap().validator_delays.extend(delays.iter().copied());
    }

    pub fn add_transaction(&self, height: u64, tx: Transaction) {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .entry(height)
            .or_default()
            .push(tx);
    }

    pub fn set_rewards(&self, rewards: Vec<RawReward>) {
        self.inner.lock().unwrap().rewards = rewards;
    }

    /// Deliver a head notification to the most recent subscriber.
    pub async fn announce(&self, height: u64) {
        let sender = self.inner.lock().unwrap().head_senders.last().cloned();
        if let Some(sender) = sender {
            let _ = sender.send(height).await;
        }
    }

    /// Simulate the transport dropping every open subscription.
    pub fn close_subscriptions(&self) {
        self.inner.lock().unwrap().head_senders.clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn height_queries(&self) -> u32 {
        self.inner.lock().unwrap().height_queries
    }

    pub fn block_fetches(&self) -> Vec<u64> {
        self.inner.lock().unwrap().block_fetches.clone()
    }

    /// Session indexes at which the validator set was fetched.
    pub fn validator_refreshes(&self) -> Vec<u64> {
        self.inner.lock().unwrap().validator_refreshes.clone()
    }

    pub fn era_reads(&self) -> u32 {
        self.inner.lock().unwrap().era_reads
    }

    pub fn disconnects(&self) -> u32 {
        self.inner.lock().unwrap().disconnects
    }

    fn record(&self, entry: &str) {
        self.inner.lock().unwrap().log.push(entry.to_string());
    }
}

/// A client handle onto a [`MockChain`].
pub struct MockClient {
    chain: MockChain,
}

impl MockClient {
    pub fn new(chain: MockChain) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ChainClient for MockClient {
    async fn current_height(&self) -> Result<u64, FeedError> {
        let mut inner = self.chain.inner.lock().unwrap();
        inner.height_queries += 1;
        if inner.failing_height_queries > 0 {
            inner.failing_height_queries -= 1;
            return Err(FeedError::Rpc("height query failed".into()));
        }
        Ok(inner.head)
    }

    async fn block_by_height(&self, height: u64) -> Result<Block, FeedError> {
        let delay = self.chain.inner.lock().unwrap().block_delays.get(&height).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.chain.inner.lock().unwrap();
        inner.block_fetches.push(height);
        if inner.failing_blocks.contains(&height) {
            return Err(FeedError::Rpc(format!("block {height} unavailable")));
        }
        let session_index = inner
            .sessions
            .get(&height)
            .copied()
            .unwrap_or(inner.default_session);
        inner.last_session_fetched = session_index;
        Ok(Block {
            height,
            hash: format!("0x{height:08x}"),
            session_index,
            era: None,
            timestamp: height as i64 * 6_000,
            transactions: inner.transactions.get(&height).cloned().unwrap_or_default(),
        })
    }

    async fn validator_set(&self) -> Result<ValidatorSet, FeedError> {
        let delay = self.chain.inner.lock().unwrap().validator_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.chain.inner.lock().unwrap();
        if inner.failing_validator_refreshes > 0 {
            inner.failing_validator_refreshes -= 1;
            return Err(FeedError::Rpc("validators unavailable".into()));
        }
        let session = inner.last_session_fetched;
        inner.validator_refreshes.push(session);
        Ok(ValidatorSet::new(session, [Validator::new("val-1"), Validator::new("val-2")]))
    }

    async fn current_era(&self) -> Result<u32, FeedError> {
        let delay = self.chain.inner.lock().unwrap().era_read_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.chain.inner.lock().unwrap();
        inner.era_reads += 1;
        if let Some(era) = inner.era_queue.pop_front() {
            inner.era = era;
        }
        Ok(inner.era)
    }

    async fn era_rewards(&self, era: u32) -> Result<Vec<RawReward>, FeedError> {
        let inner = self.chain.inner.lock().unwrap();
        Ok(inner.rewards.iter().filter(|r| r.era >= era).cloned().collect())
    }

    async fn subscribe_heads(&self) -> Result<HeadSubscription, FeedError> {
        let (tx, rx) = mpsc::channel(64);
        {
            let mut inner = self.chain.inner.lock().unwrap();
            inner.head_senders.push(tx);
            inner.log.push("subscribe".into());
        }
        let chain = self.chain.clone();
        Ok(HeadSubscription::new(rx, move || chain.record("unsubscribe")))
    }

    async fn disconnect(&self) {
        let mut inner = self.chain.inner.lock().unwrap();
        inner.disconnects += 1;
        inner.log.push("disconnect".into());
    }
}

/// Opens [`MockClient`] handles, optionally failing the first attempts.
pub struct MockConnector {
    chain: MockChain,
    connects: AtomicU32,
    failures: AtomicU32,
}

impl MockConnector {
    pub fn new(chain: MockChain) -> Self {
        Self {
            chain,
            connects: AtomicU32::new(0),
            failures: AtomicU32::new(0),
        }
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            self.chain.record("connect-failed");
            return Err(FeedError::Connection("node unreachable".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.chain.record("connect");
        Ok(Arc::new(MockClient::new(self.chain.clone())))
    }
}

// ─── Collaborators ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingStore {
    snapshots: Mutex<Vec<(String, Snapshot)>>,
    rewards: Mutex<Vec<(String, EraRewardRecord)>>,
}

impl RecordingStore {
    pub fn snapshot_heights(&self) -> Vec<u64> {
        self.snapshots.lock().unwrap().iter().map(|(_, s)| s.height).collect()
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.snapshots.lock().unwrap().last().map(|(_, s)| s.clone())
    }

    pub fn reward_rows(&self) -> Vec<EraRewardRecord> {
        self.rewards.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl PersistenceStore for RecordingStore {
    async fn write_snapshot(&self, network_id: &str, snapshot: &Snapshot) -> Result<(), FeedError> {
        self.snapshots
            .lock()
            .unwrap()
            .push((network_id.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn load_snapshot(&self, network_id: &str) -> Result<Option<Snapshot>, FeedError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == network_id)
            .map(|(_, s)| s.clone()))
    }

    async fn insert_reward_rows(
        &self,
        rows: &[EraRewardRecord],
        _era: u32,
        network_id: &str,
    ) -> Result<(), FeedError> {
        let mut rewards = self.rewards.lock().unwrap();
        rewards.extend(rows.iter().map(|r| (network_id.to_string(), r.clone())));
        Ok(())
    }

    async fn rewards_exist_for_era(&self, network_id: &str, era: u32) -> Result<bool, FeedError> {
        Ok(self
            .rewards
            .lock()
            .unwrap()
            .iter()
            .any(|(n, r)| n == network_id && r.era == era))
    }
}

/// What a [`RecordingPublisher`] saw, in publish order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    Block(u64),
    Transaction { address: String, hash: String },
    Domain { address: String, event: EventType },
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<Published> {
        self.events.lock().unwrap().clone()
    }

    pub fn block_heights(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Published::Block(h) => Some(h),
                _ => None,
            })
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn block_added(&self, _network_id: &str, block: &Block) {
        self.events.lock().unwrap().push(Published::Block(block.height));
    }

    fn transaction_added(&self, _network_id: &str, address: &str, tx: &Transaction) {
        self.events.lock().unwrap().push(Published::Transaction {
            address: address.to_string(),
            hash: tx.hash.clone(),
        });
    }

    fn domain_event(
        &self,
        _network_id: &str,
        _resource: ResourceType,
        event: EventType,
        address: &str,
        _tx: &Transaction,
    ) {
        self.events.lock().unwrap().push(Published::Domain {
            address: address.to_string(),
            event,
        });
    }
}

#[derive(Default)]
pub struct RecordingFaults {
    faults: Mutex<Vec<(FaultScope, String)>>,
}

impl RecordingFaults {
    pub fn scopes(&self) -> Vec<FaultScope> {
        self.faults.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.faults.lock().unwrap().len()
    }
}

impl FaultReporter for RecordingFaults {
    fn report(&self, scope: FaultScope, error: &FeedError) {
        self.faults.lock().unwrap().push((scope, error.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingBackfill {
    eras: Mutex<Vec<u32>>,
}

impl RecordingBackfill {
    pub fn eras(&self) -> Vec<u32> {
        self.eras.lock().unwrap().clone()
    }
}

impl BackfillTrigger for RecordingBackfill {
    fn trigger(&self, _network_id: &str, era: u32) {
        self.eras.lock().unwrap().push(era);
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

pub fn send_tx(hash: &str, height: u64, from: &str, to: &str) -> Transaction {
    Transaction {
        hash: hash.into(),
        height,
        success: true,
        involved_addresses: vec![from.into(), to.into()],
        details: TxDetails::Send {
            from: from.into(),
            to: to.into(),
            amount: Amount(1_000),
        },
    }
}

pub fn reward(era: u32, amount: u128, address: &str) -> RawReward {
    RawReward {
        amount: Amount(amount),
        height: 1_000 + era as u64,
        validator_address: "val-1".into(),
        denom: None,
        address: address.into(),
        era,
    }
}
