//! The ingestion engine. Drives a network's push subscription or poll loop
//! and runs per-block processing.
//!
//! # Push mode
//! Each new head above `last_observed_height` is dispatched as its own task
//! without waiting for earlier heights to finish. Output order is restored
//! by the reorder buffer, not by dispatch order.
//!
//! # Poll mode
//! Every `poll_interval` the head height is queried and each missing height
//! is processed in turn, in-loop. A failing tick is reported and the next
//! tick is scheduled regardless.
//!
//! # Per-block processing
//! 1. fetch the block
//! 2. push it into the reorder buffer; a released older block is published
//!    with its transaction events in the same critical section
//! 3. refresh validators on a new session  ┐ concurrently
//! 4. trigger rewards backfill on a new era ┘
//! 5. overwrite the network snapshot

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::backfill::{BackfillTrigger, NoopBackfill};
use crate::client::{ChainClient, Connector};
use crate::config::{EngineConfig, EngineStatus, IngestionMode, NetworkConfig};
use crate::connection::ConnectionLifecycleManager;
use crate::error::FeedError;
use crate::fault::{FaultReporter, FaultScope, TracingFaultReporter};
use crate::publisher::{classify_transfer, EventPublisher, ResourceType};
use crate::state::IngestionState;
use crate::store::PersistenceStore;
use crate::types::{Block, Snapshot};

// ─── Stats ────────────────────────────────────────────────────────────────────

/// Counters for one engine.
#[derive(Debug, Default)]
pub struct IngestionStats {
    blocks_processed: AtomicU64,
    blocks_failed: AtomicU64,
    blocks_published: AtomicU64,
    validator_refreshes: AtomicU64,
    backfills_triggered: AtomicU64,
}

/// Point-in-time copy of [`IngestionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks_processed: u64,
    pub blocks_failed: u64,
    pub blocks_published: u64,
    pub validator_refreshes: u64,
    pub backfills_triggered: u64,
    /// Connection rotations; only [`IngestionEngine::stats`] fills this in.
    pub handoffs: u64,
}

impl IngestionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
            blocks_published: self.blocks_published.load(Ordering::Relaxed),
            validator_refreshes: self.validator_refreshes.load(Ordering::Relaxed),
            backfills_triggered: self.backfills_triggered.load(Ordering::Relaxed),
            handoffs: 0,
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ─── Collaborators ────────────────────────────────────────────────────────────

/// External collaborators an engine writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PersistenceStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub backfill: Arc<dyn BackfillTrigger>,
    pub faults: Arc<dyn FaultReporter>,
}

impl Collaborators {
    /// Backfill disabled, faults reported through `tracing`.
    pub fn new(store: Arc<dyn PersistenceStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            backfill: Arc::new(NoopBackfill),
            faults: Arc::new(TracingFaultReporter),
        }
    }

    pub fn with_backfill(mut self, backfill: Arc<dyn BackfillTrigger>) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_faults(mut self, faults: Arc<dyn FaultReporter>) -> Self {
        self.faults = faults;
        self
    }
}

// ─── BlockProcessor ───────────────────────────────────────────────────────────

struct ProcessorInner {
    network_id: String,
    state: Mutex<IngestionState>,
    collaborators: Collaborators,
    stats: IngestionStats,
}

/// Per-block processing, shareable across concurrently running tasks.
///
/// Every state mutation happens under one short-lived lock that is never held
/// across an `.await`.
#[derive(Clone)]
pub struct BlockProcessor {
    inner: Arc<ProcessorInner>,
}

impl BlockProcessor {
    fn new(state: IngestionState, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                network_id: state.network_id.clone(),
                state: Mutex::new(state),
                collaborators,
                stats: IngestionStats::default(),
            }),
        }
    }

    pub fn network_id(&self) -> &str {
        &self.inner.network_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Run `f` against the ingestion state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut IngestionState) -> R) -> R {
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Process `height` using `client`. Faults are reported, never returned.
    pub async fn process_block(&self, client: Arc<dyn ChainClient>, height: u64) {
        let block = match client.block_by_height(height).await {
            Ok(block) => block,
            Err(e) => {
                self.fail(height, &e);
                return;
            }
        };

        // Release and publish under one lock so concurrent tasks cannot
        // reorder what the buffer emits.
        self.with_state(|s| {
            if let Some(released) = s.reorder.push(block.clone()) {
                self.publish(&released);
            }
        });

        match self.apply(client.as_ref(), &block).await {
            Ok(()) => {
                IngestionStats::bump(&self.inner.stats.blocks_processed);
                tracing::debug!(network = %self.inner.network_id, height, "block processed");
            }
            Err(e) => self.fail(height, &e),
        }
    }

    async fn apply(&self, client: &dyn ChainClient, block: &Block) -> Result<(), FeedError> {
        let (validators, era) = tokio::join!(
            self.refresh_validators(client, block),
            self.check_era(client, block)
        );
        validators?;
        era?;

        let snapshot = self.with_state(|s| Snapshot {
            height: block.height,
            block: block.clone(),
            validator_set: s.validator_set.clone(),
            era: s.current_era,
            updated_at: chrono::Utc::now().timestamp(),
        });
        self.inner
            .collaborators
            .store
            .write_snapshot(&self.inner.network_id, &snapshot)
            .await
    }

    /// Refresh the validator set when `block` opens a new session.
    async fn refresh_validators(&self, client: &dyn ChainClient, block: &Block) -> Result<(), FeedError> {
        let session = block.session_index;
        let Some(previous) = self.with_state(|s| s.claim_session(session)) else {
            return Ok(());
        };

        tracing::info!(
            network = %self.inner.network_id,
            session,
            height = block.height,
            "new session, fetching validators"
        );

        match client.validator_set().await {
            Ok(mut set) => {
                set.session_index = session;
                let count = set.len();
                self.with_state(|s| s.install_validators(set));
                IngestionStats::bump(&self.inner.stats.validator_refreshes);
                tracing::debug!(network = %self.inner.network_id, session, validators = count, "validator set replaced");
                Ok(())
            }
            Err(e) => {
                self.with_state(|s| s.release_session(session, previous));
                Err(e)
            }
        }
    }

    /// Read the era and trigger a backfill when it advanced.
    async fn check_era(&self, client: &dyn ChainClient, block: &Block) -> Result<(), FeedError> {
        let era = match block.era {
            Some(era) => era,
            None => client.current_era().await?,
        };

        if self.with_state(|s| s.observe_era(era)) {
            tracing::info!(network = %self.inner.network_id, era, "new era, triggering rewards backfill");
            self.inner
                .collaborators
                .backfill
                .trigger(&self.inner.network_id, era);
            IngestionStats::bump(&self.inner.stats.backfills_triggered);
        }
        Ok(())
    }

    fn publish(&self, block: &Block) {
        let network_id = &self.inner.network_id;
        let publisher = &self.inner.collaborators.publisher;

        publisher.block_added(network_id, block);
        for tx in &block.transactions {
            for address in &tx.involved_addresses {
                publisher.transaction_added(network_id, address, tx);
                if let Some(event) = classify_transfer(address, tx) {
                    publisher.domain_event(network_id, ResourceType::Transaction, event, address, tx);
                }
            }
        }
        IngestionStats::bump(&self.inner.stats.blocks_published);
    }

    fn fail(&self, height: u64, error: &FeedError) {
        IngestionStats::bump(&self.inner.stats.blocks_failed);
        self.report(
            FaultScope::Block {
                network_id: self.inner.network_id.clone(),
                height,
            },
            error,
        );
    }

    fn report(&self, scope: FaultScope, error: &FeedError) {
        self.inner.collaborators.faults.report(scope, error);
    }
}

// ─── IngestionEngine ──────────────────────────────────────────────────────────

/// Ingests one network for the lifetime of the process.
pub struct IngestionEngine {
    network: NetworkConfig,
    config: EngineConfig,
    connection: ConnectionLifecycleManager,
    processor: BlockProcessor,
    status: watch::Sender<EngineStatus>,
    tasks: JoinSet<()>,
}

impl IngestionEngine {
    pub fn new(
        network: NetworkConfig,
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        collaborators: Collaborators,
    ) -> Self {
        let connection = ConnectionLifecycleManager::new(
            network.id.clone(),
            connector,
            config.max_connection_age(),
            config.handoff_grace(),
        );
        let state = IngestionState::new(network.id.clone(), config.reorder_capacity);
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            processor: BlockProcessor::new(state, collaborators),
            network,
            config,
            connection,
            status,
            tasks: JoinSet::new(),
        }
    }

    pub fn network_id(&self) -> &str {
        &self.network.id
    }

    /// Watch the engine status.
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Handle onto block processing and ingestion state.
    pub fn processor(&self) -> BlockProcessor {
        self.processor.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            handoffs: self.connection.handoffs(),
            ..self.processor.stats()
        }
    }

    /// Ingest until the process exits.
    pub async fn run(mut self) {
        tracing::info!(network = %self.network.id, mode = %self.network.mode, "starting ingestion");
        match self.network.mode {
            IngestionMode::Push => self.run_push().await,
            IngestionMode::Poll => self.run_poll().await,
        }
    }

    async fn run_push(&mut self) {
        let mut reconnecting = false;
        loop {
            let client = self.connect().await;
            let mut subscription = match client.subscribe_heads().await {
                Ok(subscription) => subscription,
                Err(e) => {
                    self.report_connection(&e);
                    self.connection.mark_lost();
                    tokio::time::sleep(self.config.reconnect_delay()).await;
                    continue;
                }
            };

            if reconnecting {
                self.reconcile(&client).await;
            }
            reconnecting = true;

            loop {
                let Some(height) = subscription.next().await else {
                    self.report_connection(&FeedError::Connection("head subscription closed".into()));
                    self.connection.mark_lost();
                    tokio::time::sleep(self.config.reconnect_delay()).await;
                    break;
                };

                self.reap_tasks();
                if self.processor.with_state(|s| s.observe_head(height)) {
                    self.dispatch(&client, height);
                }

                // Rotate right after a dispatched head so none is skipped.
                if self.connection.is_expired() {
                    self.connection.begin_handoff(Some(subscription));
                    break;
                }
            }
        }
    }

    async fn run_poll(&mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll_cycle().await;
        }
    }

    /// Connect if needed, run one tick, then rotate an expired handle.
    async fn poll_cycle(&mut self) {
        let client = self.connect().await;

        if let Err(e) = self.poll_tick(&client).await {
            self.processor.report(
                FaultScope::Poll {
                    network_id: self.network.id.clone(),
                },
                &e,
            );
        }

        if self.connection.is_expired() {
            self.connection.begin_handoff(None);
        }
    }

    /// One poll tick: process every height up to the remote head, in order.
    async fn poll_tick(&self, client: &Arc<dyn ChainClient>) -> Result<(), FeedError> {
        let head = client.current_height().await?;
        while let Some(height) = self.processor.with_state(|s| s.next_poll_height(head)) {
            self.processor.process_block(Arc::clone(client), height).await;
        }
        Ok(())
    }

    /// Obtain a ready handle, retrying failed attempts after a fixed delay.
    async fn connect(&mut self) -> Arc<dyn ChainClient> {
        if let Some(client) = self.connection.active() {
            return client;
        }

        self.set_status(EngineStatus::Connecting);
        loop {
            match self.connection.ensure_connected().await {
                Ok(client) => {
                    let opened_at = self.connection.opened_at();
                    self.processor.with_state(|s| s.connection_opened_at = opened_at);
                    self.set_status(EngineStatus::Running(self.network.mode));
                    return client;
                }
                Err(e) => {
                    self.report_connection(&e);
                    tokio::time::sleep(self.config.reconnect_delay()).await;
                }
            }
        }
    }

    /// Dispatch heights announced while the previous handle was retired.
    async fn reconcile(&mut self, client: &Arc<dyn ChainClient>) {
        let window = self.config.reconcile_window;
        if !self.config.reconcile_on_reconnect || window == 0 {
            return;
        }

        let head = match client.current_height().await {
            Ok(head) => head,
            Err(e) => {
                self.report_connection(&e);
                return;
            }
        };

        let missed = self.processor.with_state(|s| {
            let last = s.last_observed_height?;
            if head <= last {
                return None;
            }
            let from = (last + 1).max(head.saturating_sub(window - 1));
            s.last_observed_height = Some(head);
            Some((last, from..=head))
        });

        if let Some((last, heights)) = missed {
            tracing::info!(
                network = %self.network.id,
                from = *heights.start(),
                to = *heights.end(),
                skipped = heights.start() - last - 1,
                "replaying heights missed during reconnect"
            );
            for height in heights {
                self.dispatch(client, height);
            }
        }
    }

    fn dispatch(&mut self, client: &Arc<dyn ChainClient>, height: u64) {
        let processor = self.processor.clone();
        let client = Arc::clone(client);
        self.tasks
            .spawn(async move { processor.process_block(client, height).await });
    }

    /// Collect finished block tasks so the set does not grow unbounded.
    fn reap_tasks(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!(network = %self.network.id, error = %e, "block task aborted");
            }
        }
    }

    fn report_connection(&self, error: &FeedError) {
        self.processor.report(
            FaultScope::Connection {
                network_id: self.network.id.clone(),
            },
            error,
        );
    }

    fn set_status(&self, status: EngineStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::builder::EngineConfigBuilder;
    use crate::publisher::EventType;
    use crate::testing::{
        send_tx, MockChain, MockClient, MockConnector, Published, RecordingBackfill,
        RecordingFaults, RecordingPublisher, RecordingStore,
    };

    struct Harness {
        chain: MockChain,
        connector: Arc<MockConnector>,
        store: Arc<RecordingStore>,
        publisher: Arc<RecordingPublisher>,
        backfill: Arc<RecordingBackfill>,
        faults: Arc<RecordingFaults>,
    }

    impl Harness {
        fn new() -> Self {
            let chain = MockChain::new();
            Self {
                connector: Arc::new(MockConnector::new(chain.clone())),
                chain,
                store: Arc::default(),
                publisher: Arc::default(),
                backfill: Arc::default(),
                faults: Arc::default(),
            }
        }

        fn engine(&self, mode: IngestionMode, config: EngineConfig) -> IngestionEngine {
            let network = NetworkConfig::new("polkadot", "mock", "ws://127.0.0.1:9944").with_mode(mode);
            let collaborators = Collaborators::new(self.store.clone(), self.publisher.clone())
                .with_backfill(self.backfill.clone())
                .with_faults(self.faults.clone());
            IngestionEngine::new(network, config, self.connector.clone(), collaborators)
        }

        fn client(&self) -> Arc<dyn ChainClient> {
            Arc::new(MockClient::new(self.chain.clone()))
        }
    }

    fn immediate_publish() -> EngineConfig {
        EngineConfigBuilder::new().reorder_capacity(0).build()
    }

    #[tokio::test]
    async fn late_block_is_published_in_order() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Push, EngineConfig::default()).processor();

        for height in [5, 6, 4, 7, 8] {
            processor.process_block(h.client(), height).await;
        }

        assert_eq!(h.publisher.block_heights(), vec![4, 5, 6]);
        assert_eq!(h.store.snapshot_heights(), vec![5, 6, 4, 7, 8]);
    }

    #[tokio::test]
    async fn validators_refreshed_once_per_new_session() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, EngineConfig::default()).processor();
        for (height, session) in [(1, 10), (2, 10), (3, 10), (4, 11), (5, 11)] {
            h.chain.set_session(height, session);
        }

        for height in 1..=3 {
            processor.process_block(h.client(), height).await;
        }
        assert_eq!(h.chain.validator_refreshes(), vec![10]);

        processor.process_block(h.client(), 4).await;
        assert_eq!(h.chain.validator_refreshes(), vec![10, 11]);

        processor.process_block(h.client(), 5).await;
        assert_eq!(h.chain.validator_refreshes(), vec![10, 11]);

        let snapshot = h.store.last_snapshot().unwrap();
        assert_eq!(snapshot.validator_set.unwrap().session_index, 11);
        assert_eq!(processor.stats().validator_refreshes, 2);
    }

    #[tokio::test]
    async fn backfill_triggered_once_per_new_era() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, EngineConfig::default()).processor();
        h.chain.queue_eras(&[3]);
        processor.process_block(h.client(), 1).await;
        assert_eq!(h.backfill.eras(), vec![3]);

        h.chain.queue_eras(&[3, 3, 4]);
        for height in 2..=4 {
            processor.process_block(h.client(), height).await;
        }

        assert_eq!(h.backfill.eras(), vec![3, 4]);
        assert_eq!(h.store.last_snapshot().unwrap().era, Some(4));
    }

    #[tokio::test]
    async fn era_is_read_for_every_block() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, EngineConfig::default()).processor();

        processor.process_block(h.client(), 1).await;
        processor.process_block(h.client(), 2).await;

        assert_eq!(h.chain.era_reads(), 2);
        assert_eq!(h.backfill.eras(), vec![0]);
    }

    #[tokio::test]
    async fn send_is_classified_per_address() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, immediate_publish()).processor();
        h.chain.add_transaction(7, send_tx("0xabc", 7, "A", "B"));

        processor.process_block(h.client(), 7).await;

        assert_eq!(
            h.publisher.events(),
            vec![
                Published::Block(7),
                Published::Transaction { address: "A".into(), hash: "0xabc".into() },
                Published::Domain { address: "A".into(), event: EventType::TransactionSend },
                Published::Transaction { address: "B".into(), hash: "0xabc".into() },
                Published::Domain { address: "B".into(), event: EventType::TransactionReceive },
            ]
        );
    }

    #[tokio::test]
    async fn failed_fetch_skips_only_that_height() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, immediate_publish()).processor();
        h.chain.fail_block(42);

        for height in [41, 42, 43] {
            processor.process_block(h.client(), height).await;
        }

        assert_eq!(h.store.snapshot_heights(), vec![41, 43]);
        assert_eq!(h.publisher.block_heights(), vec![41, 43]);
        assert_eq!(
            h.faults.scopes(),
            vec![FaultScope::Block { network_id: "polkadot".into(), height: 42 }]
        );
        let stats = processor.stats();
        assert_eq!(stats.blocks_failed, 1);
        assert_eq!(stats.blocks_processed, 2);
    }

    #[tokio::test]
    async fn failed_validator_refresh_is_retried_by_next_block() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Poll, EngineConfig::default()).processor();
        h.chain.set_session(1, 10);
        h.chain.set_session(2, 10);
        h.chain.fail_validator_refreshes(1);

        processor.process_block(h.client(), 1).await;
        assert!(h.store.snapshot_heights().is_empty());

        processor.process_block(h.client(), 2).await;
        assert_eq!(h.chain.validator_refreshes(), vec![10]);
        assert_eq!(h.store.snapshot_heights(), vec![2]);
        assert_eq!(h.faults.count(), 1);
    }

    #[tokio::test]
    async fn released_block_is_published_when_later_refresh_fails() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Push, EngineConfig::default()).processor();
        processor.process_block(h.client(), 1).await;
        processor.process_block(h.client(), 2).await;
        h.chain.set_session(3, 2);
        h.chain.fail_validator_refreshes(1);

        processor.process_block(h.client(), 3).await;

        assert_eq!(h.publisher.block_heights(), vec![1]);
        assert_eq!(h.store.snapshot_heights(), vec![1, 2]);
        assert_eq!(
            h.faults.scopes(),
            vec![FaultScope::Block { network_id: "polkadot".into(), height: 3 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_era_read_does_not_reorder_publishes() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Push, EngineConfig::default()).processor();
        processor.process_block(h.client(), 1).await;
        processor.process_block(h.client(), 2).await;
        h.chain.delay_era_reads(&[Duration::from_millis(500)]);

        let third = tokio::spawn({
            let processor = processor.clone();
            let client = h.client();
            async move { processor.process_block(client, 3).await }
        });
        tokio::task::yield_now().await;
        let fourth = tokio::spawn({
            let processor = processor.clone();
            let client = h.client();
            async move { processor.process_block(client, 4).await }
        });
        third.await.unwrap();
        fourth.await.unwrap();

        assert_eq!(h.publisher.block_heights(), vec![1, 2]);
        assert_eq!(h.store.snapshot_heights(), vec![1, 2, 4, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_validator_refresh_does_not_reorder_publishes() {
        let h = Harness::new();
        let processor = h.engine(IngestionMode::Push, EngineConfig::default()).processor();
        processor.process_block(h.client(), 1).await;
        processor.process_block(h.client(), 2).await;
        h.chain.set_session(3, 2);
        h.chain.set_session(4, 2);
        h.chain.delay_validator_refreshes(&[Duration::from_millis(500)]);

        let third = tokio::spawn({
            let processor = processor.clone();
            let client = h.client();
            async move { processor.process_block(client, 3).await }
        });
        tokio::task::yield_now().await;
        let fourth = tokio::spawn({
            let processor = processor.clone();
            let client = h.client();
            async move { processor.process_block(client, 4).await }
        });
        third.await.unwrap();
        fourth.await.unwrap();

        assert_eq!(h.publisher.block_heights(), vec![1, 2]);
        assert_eq!(h.chain.validator_refreshes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn push_mode_restores_order_of_concurrent_fetches() {
        let h = Harness::new();
        let engine = h.engine(IngestionMode::Push, EngineConfig::default());
        let mut status = engine.status();
        assert_eq!(*status.borrow(), EngineStatus::Idle);
        h.chain.delay_block(10, Duration::from_millis(200));
        h.chain.delay_block(11, Duration::from_millis(100));
        let running = tokio::spawn(engine.run());

        status.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*status.borrow(), EngineStatus::Running(IngestionMode::Push));

        for height in [10, 11, 12] {
            h.chain.announce(height).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        // 12 finished first, then 11, then 10; nothing released yet past 10.
        assert_eq!(h.publisher.block_heights(), vec![10]);

        h.chain.announce(13).await;
        h.chain.announce(14).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.publisher.block_heights(), vec![10, 11, 12]);

        // Stale and repeated heads are ignored.
        h.chain.announce(14).await;
        h.chain.announce(9).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.chain.block_fetches().len(), 5);

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn push_mode_rotates_connection_after_max_age() {
        let h = Harness::new();
        let config = EngineConfigBuilder::new()
            .max_connection_age_secs(60)
            .handoff_grace_secs(300)
            .build();
        let engine = h.engine(IngestionMode::Push, config);
        let running = tokio::spawn(engine.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.chain.set_head(1);
        h.chain.announce(1).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        h.chain.set_head(2);
        h.chain.announce(2).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            h.chain.log(),
            vec!["connect", "subscribe", "unsubscribe", "connect", "subscribe"]
        );
        assert_eq!(h.connector.connects(), 2);
        assert_eq!(h.chain.disconnects(), 0);

        // Heads reach the new subscription.
        h.chain.announce(3).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.chain.block_fetches(), vec![1, 2, 3]);

        // The retired handle is closed after the grace window.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.chain.disconnects(), 1);

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replays_missed_heights() {
        let h = Harness::new();
        let config = EngineConfigBuilder::new()
            .max_connection_age_secs(60)
            .reconcile_window(16)
            .build();
        let engine = h.engine(IngestionMode::Push, config);
        let running = tokio::spawn(engine.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.chain.announce(1).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        // Heads 3..=5 were produced while the handle was being replaced.
        h.chain.set_head(5);
        h.chain.announce(2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut fetched = h.chain.block_fetches();
        fetched.sort_unstable();
        assert_eq!(fetched, vec![1, 2, 3, 4, 5]);

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn lost_subscription_reconnects() {
        let h = Harness::new();
        let engine = h.engine(IngestionMode::Push, EngineConfig::default());
        let running = tokio::spawn(engine.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.chain.close_subscriptions();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.connector.connects(), 2);
        assert_eq!(h.chain.disconnects(), 1);
        assert!(h
            .faults
            .scopes()
            .contains(&FaultScope::Connection { network_id: "polkadot".into() }));

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_survives_failing_ticks() {
        let h = Harness::new();
        h.chain.set_head(100);
        h.chain.fail_height_queries(2);
        let engine = h.engine(IngestionMode::Poll, EngineConfig::default());
        let running = tokio::spawn(engine.run());

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(h.chain.height_queries() >= 4);
        assert_eq!(
            h.faults.scopes(),
            vec![
                FaultScope::Poll { network_id: "polkadot".into() },
                FaultScope::Poll { network_id: "polkadot".into() },
            ]
        );
        assert_eq!(h.chain.block_fetches(), vec![100]);

        h.chain.set_head(103);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.chain.block_fetches(), vec![100, 101, 102, 103]);

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_retries_failed_connects() {
        let h = Harness::new();
        h.chain.set_head(7);
        h.connector.fail_next_connects(2);
        let engine = h.engine(IngestionMode::Poll, EngineConfig::default());
        let running = tokio::spawn(engine.run());

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.connector.connects(), 1);
        assert_eq!(h.faults.count(), 2);
        assert_eq!(h.chain.block_fetches(), vec![7]);

        running.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_rotation_is_counted_in_engine_stats() {
        let h = Harness::new();
        h.chain.set_head(1);
        let config = EngineConfigBuilder::new().max_connection_age_secs(60).build();
        let mut engine = h.engine(IngestionMode::Poll, config);

        engine.poll_cycle().await;
        assert_eq!(engine.stats().handoffs, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        engine.poll_cycle().await;
        assert_eq!(engine.stats().handoffs, 1);
        assert_eq!(engine.processor().stats().handoffs, 0);

        engine.poll_cycle().await;
        assert_eq!(h.connector.connects(), 2);
        assert_eq!(engine.stats().handoffs, 1);
    }
}
