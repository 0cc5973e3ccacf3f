//! Historical reward backfill, triggered on era transitions.
//!
//! The ingestion path only ever calls [`BackfillTrigger::trigger`], which must
//! return immediately. The work itself runs elsewhere: in a spawned OS process
//! ([`ProcessBackfill`]) or on an in-process worker ([`BackfillQueue`]). Both
//! end up in [`RewardsBackfillJob::run`], which is idempotent per era.

use std::ffi::OsString;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::Connector;
use crate::error::FeedError;
use crate::fault::{FaultReporter, FaultScope};
use crate::store::PersistenceStore;
use crate::types::EraRewardRecord;

/// Starts a backfill for an era without waiting for it.
pub trait BackfillTrigger: Send + Sync {
    fn trigger(&self, network_id: &str, era: u32);
}

/// Discards triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackfill;

impl BackfillTrigger for NoopBackfill {
    fn trigger(&self, network_id: &str, era: u32) {
        tracing::debug!(network = %network_id, era, "rewards backfill disabled");
    }
}

// ─── Job ──────────────────────────────────────────────────────────────────────

/// Result of a completed backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Rows for the era were already stored; nothing fetched.
    AlreadyPresent,
    /// This many rows were inserted.
    Stored(usize),
}

/// Fetches and stores the reward rows for one era boundary.
pub struct RewardsBackfillJob {
    network_id: String,
    default_denom: String,
    connector: Arc<dyn Connector>,
    store: Arc<dyn PersistenceStore>,
}

impl RewardsBackfillJob {
    pub fn new(
        network_id: impl Into<String>,
        default_denom: impl Into<String>,
        connector: Arc<dyn Connector>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            default_denom: default_denom.into(),
            connector,
            store,
        }
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Backfill `era`. Safe to re-run: an era with stored rows is skipped.
    pub async fn run(&self, era: u32) -> Result<BackfillOutcome, FeedError> {
        if self.store.rewards_exist_for_era(&self.network_id, era).await? {
            tracing::info!(network = %self.network_id, era, "rewards already stored, skipping");
            return Ok(BackfillOutcome::AlreadyPresent);
        }

        // A dedicated handle keeps the long fetch off the ingestion connection.
        let client = self.connector.connect().await?;
        let fetched = client.era_rewards(era).await;
        client.disconnect().await;
        let raw = fetched?;
        let total = raw.len();

        let rows: Vec<EraRewardRecord> = raw
            .into_iter()
            .filter(|r| !r.amount.is_zero())
            .map(|r| EraRewardRecord::from_raw(r, &self.default_denom))
            .collect();

        self.store
            .insert_reward_rows(&rows, era, &self.network_id)
            .await?;

        tracing::info!(
            network = %self.network_id,
            era,
            fetched = total,
            stored = rows.len(),
            "rewards backfill complete"
        );
        Ok(BackfillOutcome::Stored(rows.len()))
    }
}

// ─── Out-of-process trigger ───────────────────────────────────────────────────

/// Runs each backfill as a child process: `program args… --era=<n>`.
///
/// A non-zero exit status is reported as [`FeedError::Backfill`]; nothing is
/// read back from the child.
#[derive(Clone)]
pub struct ProcessBackfill {
    program: OsString,
    args: Vec<OsString>,
    faults: Arc<dyn FaultReporter>,
}

impl ProcessBackfill {
    pub fn new<I, S>(program: impl Into<OsString>, args: I, faults: Arc<dyn FaultReporter>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            faults,
        }
    }

    /// The command line for `era`.
    pub fn command(&self, era: u32) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).arg(format!("--era={era}"));
        cmd
    }

    /// Run the child for `era` to completion.
    pub async fn run(&self, era: u32) -> Result<(), FeedError> {
        let status = self
            .command(era)
            .status()
            .await
            .map_err(|e| FeedError::Backfill { era, reason: e.to_string() })?;
        if status.success() {
            Ok(())
        } else {
            Err(FeedError::Backfill {
                era,
                reason: format!("process exited with {status}"),
            })
        }
    }
}

impl BackfillTrigger for ProcessBackfill {
    fn trigger(&self, network_id: &str, era: u32) {
        let backfill = self.clone();
        let network_id = network_id.to_string();

        tracing::info!(network = %network_id, era, "starting rewards backfill process");
        tokio::spawn(async move {
            match backfill.run(era).await {
                Ok(()) => tracing::info!(network = %network_id, era, "rewards backfill process finished"),
                Err(e) => backfill.faults.report(FaultScope::Backfill { network_id, era }, &e),
            }
        });
    }
}

// ─── In-process queue ─────────────────────────────────────────────────────────

/// Single-worker job queue running [`RewardsBackfillJob`]s in order.
#[derive(Clone)]
pub struct BackfillQueue {
    tx: mpsc::UnboundedSender<u32>,
}

impl BackfillQueue {
    /// Start the worker. It stops once every queue handle is dropped.
    pub fn spawn(job: RewardsBackfillJob, faults: Arc<dyn FaultReporter>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
        let worker = tokio::spawn(async move {
            while let Some(era) = rx.recv().await {
                if let Err(e) = job.run(era).await {
                    faults.report(
                        FaultScope::Backfill {
                            network_id: job.network_id().to_string(),
                            era,
                        },
                        &e,
                    );
                }
            }
        });
        (Self { tx }, worker)
    }
}

impl BackfillTrigger for BackfillQueue {
    fn trigger(&self, network_id: &str, era: u32) {
        if self.tx.send(era).is_err() {
            tracing::warn!(network = %network_id, era, "backfill worker has stopped");
        }
    }
}
