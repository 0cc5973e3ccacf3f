//! chainfeed-substrate — `ChainClient` adapter for Substrate ledgers
//! (Polkadot, Kusama, Westend).
//!
//! # Architecture
//!
//! ```text
//! SubstrateConnector ──connect──▶ SubstrateClient<HttpSidecar>
//!                                     ├── reads:  Substrate API sidecar (REST, reqwest)
//!                                     │             └── decode (JSON → Block / ValidatorSet / RawReward)
//!                                     └── heads:  node WebSocket chain_subscribeNewHeads
//! ```
//!
//! # Usage
//! ```rust,no_run
//! use chainfeed_core::registry::ConnectorRegistry;
//!
//! let mut registry = ConnectorRegistry::new();
//! chainfeed_substrate::register(&mut registry);
//! assert!(registry.supports("polkadot"));
//! ```

pub mod client;
pub mod connector;
pub mod decode;
pub mod heads;
pub mod transport;

pub use client::SubstrateClient;
pub use connector::{register, SubstrateConnector};
pub use heads::subscribe_new_heads;
pub use transport::{HttpSidecar, SidecarTransport};
