//! Fluent builder for [`EngineConfig`].
//!
//! # Example
//!
//! ```rust
//! use chainfeed_core::builder::EngineConfigBuilder;
//!
//! let config = EngineConfigBuilder::new()
//!     .poll_interval_ms(500)
//!     .max_connection_age_secs(3_600)
//!     .handoff_grace_secs(60)
//!     .build();
//! assert_eq!(config.reorder_capacity, 2);
//! ```

use crate::config::EngineConfig;

/// Fluent builder for `EngineConfig`.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set the poll mode tick interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the maximum connection age before rotation.
    pub fn max_connection_age_secs(mut self, secs: u64) -> Self {
        self.config.max_connection_age_secs = secs;
        self
    }

    /// Set how long a retired handle stays open.
    pub fn handoff_grace_secs(mut self, secs: u64) -> Self {
        self.config.handoff_grace_secs = secs;
        self
    }

    /// Set the delay between connection attempts.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Set the reorder buffer capacity.
    pub fn reorder_capacity(mut self, capacity: usize) -> Self {
        self.config.reorder_capacity = capacity;
        self
    }

    /// Enable or disable the post-reconnect height replay.
    pub fn reconcile_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.reconcile_on_reconnect = enabled;
        self
    }

    /// Cap the number of heights replayed after a reconnect.
    pub fn reconcile_window(mut self, heights: u64) -> Self {
        self.config.reconcile_window = heights;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
