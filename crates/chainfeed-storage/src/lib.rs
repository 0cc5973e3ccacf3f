//! chainfeed-storage — persistence backends for ChainFeed.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (single-file persistence)
//!
//! Both implement [`chainfeed_core::PersistenceStore`]: one snapshot per
//! network, overwritten on every processed block, plus append-only reward
//! rows written by the era backfill.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
