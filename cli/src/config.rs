//! The `chainfeed` configuration file (JSON).

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use chainfeed_core::config::{EngineConfig, NetworkConfig};

use crate::logging::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
}

/// Where snapshots and reward rows go. In memory unless a SQLite path is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillMode {
    /// Re-invoke this binary's `backfill` subcommand as a child process.
    #[default]
    Process,
    /// Run jobs on an in-process worker.
    InProcess,
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default)]
    pub mode: BackfillMode,
    /// Program for process mode; defaults to the running executable.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments for process mode, before the appended `--era=<n>`.
    /// Defaults to `backfill --config <file> --network <id>`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl FeedConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("no networks configured");
        }
        let mut seen = HashSet::new();
        for network in &self.networks {
            if !seen.insert(network.id.as_str()) {
                bail!("duplicate network id '{}'", network.id);
            }
        }
        Ok(())
    }

    pub fn network(&self, id: &str) -> Result<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.id == id)
            .with_context(|| format!("network '{id}' is not configured"))
    }

    /// Enabled networks, restricted to `only` when it is non-empty.
    pub fn selected_networks(&self, only: &[String]) -> Vec<&NetworkConfig> {
        self.networks
            .iter()
            .filter(|n| n.enabled)
            .filter(|n| only.is_empty() || only.contains(&n.id))
            .collect()
    }
}
