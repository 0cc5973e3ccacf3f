//! Connector and registry hook for Substrate networks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chainfeed_core::client::{ChainClient, Connector};
use chainfeed_core::config::NetworkConfig;
use chainfeed_core::error::FeedError;
use chainfeed_core::registry::ConnectorRegistry;

use crate::client::SubstrateClient;
use crate::transport::HttpSidecar;

/// Network types served by this adapter.
pub const NETWORK_TYPES: [&str; 2] = ["polkadot", "substrate"];

/// Opens [`SubstrateClient`] handles for one network.
///
/// Reads go to `api_url` (falling back to `rpc_url`); head subscriptions use
/// `rpc_url` when it is a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct SubstrateConnector {
    network: NetworkConfig,
    request_timeout: Duration,
}

impl SubstrateConnector {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn heads_url(&self) -> Option<&str> {
        let url = self.network.rpc_url.as_str();
        (url.starts_with("ws://") || url.starts_with("wss://")).then_some(url)
    }
}

#[async_trait]
impl Connector for SubstrateConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
        let transport = HttpSidecar::new(self.network.read_url(), self.request_timeout)?;
        let mut client = SubstrateClient::new(self.network.id.clone(), transport);
        if let Some(url) = self.heads_url() {
            client = client.with_heads_url(url);
        }

        // Ready means the sidecar answers.
        let head = client
            .current_height()
            .await
            .map_err(|e| FeedError::Connection(format!("{}: {e}", self.network.read_url())))?;
        tracing::info!(network = %self.network.id, head, "substrate client ready");

        Ok(Arc::new(client))
    }
}

/// Register the Substrate connector for every network type it serves.
pub fn register(registry: &mut ConnectorRegistry) {
    for network_type in NETWORK_TYPES {
        registry.register(network_type, |network: &NetworkConfig| {
            Ok(Arc::new(SubstrateConnector::new(network.clone())) as Arc<dyn Connector>)
        });
    }
}
