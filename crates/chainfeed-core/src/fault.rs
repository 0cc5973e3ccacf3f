//! Fault reporting: where caught errors go instead of propagating.

use std::fmt;

use crate::error::FeedError;

/// Where a fault was caught.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultScope {
    /// A poll tick (height query or sequential processing).
    Poll { network_id: String },
    /// Processing of a single height.
    Block { network_id: String, height: u64 },
    /// Opening, subscribing, or rotating a connection.
    Connection { network_id: String },
    /// An era's rewards backfill.
    Backfill { network_id: String, era: u32 },
}

impl FaultScope {
    pub fn network_id(&self) -> &str {
        match self {
            Self::Poll { network_id }
            | Self::Block { network_id, .. }
            | Self::Connection { network_id }
            | Self::Backfill { network_id, .. } => network_id,
        }
    }
}

impl fmt::Display for FaultScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll { network_id } => write!(f, "{network_id}: poll"),
            Self::Block { network_id, height } => write!(f, "{network_id}: block {height}"),
            Self::Connection { network_id } => write!(f, "{network_id}: connection"),
            Self::Backfill { network_id, era } => write!(f, "{network_id}: backfill era {era}"),
        }
    }
}

/// External fault sink. Reporting must never fail or block.
pub trait FaultReporter: Send + Sync {
    fn report(&self, scope: FaultScope, error: &FeedError);
}

/// Reports faults as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report(&self, scope: FaultScope, error: &FeedError) {
        match &scope {
            FaultScope::Block { network_id, height } => {
                tracing::error!(network = %network_id, height, error = %error, "block processing failed");
            }
            FaultScope::Backfill { network_id, era } => {
                tracing::error!(network = %network_id, era, error = %error, "rewards backfill failed");
            }
            FaultScope::Poll { network_id } => {
                tracing::error!(network = %network_id, error = %error, "failed to check for a new block");
            }
            FaultScope::Connection { network_id } => {
                tracing::error!(network = %network_id, error = %error, "connection fault");
            }
        }
    }
}
