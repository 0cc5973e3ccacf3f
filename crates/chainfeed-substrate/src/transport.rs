//! REST transport to a Substrate API sidecar.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chainfeed_core::error::FeedError;

/// GET access to sidecar routes. Paths start with `/`.
#[async_trait]
pub trait SidecarTransport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, FeedError>;

    fn base_url(&self) -> &str;
}

/// Sidecar transport backed by `reqwest`.
pub struct HttpSidecar {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSidecar {
    /// Create a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FeedError::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Create with a 30 second request timeout.
    pub fn default_for(base_url: impl Into<String>) -> Result<Self, FeedError> {
        Self::new(base_url, Duration::from_secs(30))
    }
}

#[async_trait]
impl SidecarTransport for HttpSidecar {
    async fn get(&self, path: &str) -> Result<Value, FeedError> {
        let url = format!("{}{path}", self.base_url);
        tracing::trace!(%url, "sidecar request");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Rpc(format!("HTTP {status} for {path}: {body}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| FeedError::Decode(format!("{path}: {e}")))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
