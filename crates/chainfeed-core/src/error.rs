//! Error types for the chainfeed ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting a network.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backfill for era {era} failed: {reason}")]
    Backfill { era: u32, reason: String },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("No chain client registered for network type '{0}'")]
    UnsupportedNetwork(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Returns `true` for remote I/O faults that the next tick or
    /// notification may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Connection(_))
    }

    /// Returns `true` if the remote answered with data we could not interpret.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_faults() {
        assert!(FeedError::Rpc("timeout".into()).is_transient());
        assert!(FeedError::Connection("reset".into()).is_transient());
        assert!(!FeedError::Decode("bad block".into()).is_transient());
        assert!(FeedError::Decode("bad block".into()).is_decode());
    }

    #[test]
    fn backfill_message_names_era() {
        let err = FeedError::Backfill { era: 812, reason: "exit status 1".into() };
        assert_eq!(err.to_string(), "Backfill for era 812 failed: exit status 1");
    }
}
