//! Connector lookup by network type.
//!
//! Adapter crates register a factory per `network_type` they support; the
//! binary resolves each configured network through the registry at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::Connector;
use crate::config::NetworkConfig;
use crate::error::FeedError;

type ConnectorFactory =
    Arc<dyn Fn(&NetworkConfig) -> Result<Arc<dyn Connector>, FeedError> + Send + Sync>;

/// Maps network types to connector factories.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `network_type`, replacing any previous one.
    pub fn register<F>(&mut self, network_type: impl Into<String>, factory: F)
    where
        F: Fn(&NetworkConfig) -> Result<Arc<dyn Connector>, FeedError> + Send + Sync + 'static,
    {
        self.factories.insert(network_type.into(), Arc::new(factory));
    }

    /// Build the connector for `network`.
    pub fn connector_for(&self, network: &NetworkConfig) -> Result<Arc<dyn Connector>, FeedError> {
        let factory = self
            .factories
            .get(&network.network_type)
            .ok_or_else(|| FeedError::UnsupportedNetwork(network.network_type.clone()))?;
        factory(network)
    }

    pub fn supports(&self, network_type: &str) -> bool {
        self.factories.contains_key(network_type)
    }

    /// Registered network types, sorted.
    pub fn network_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
