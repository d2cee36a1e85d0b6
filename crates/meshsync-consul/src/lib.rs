//! Consul catalog support for meshsync
//!
//! - `client` - HTTP client for the catalog endpoints
//! - `watcher` - polling watcher that publishes endpoint snapshots

pub mod client;
pub mod error;
pub mod watcher;

pub use client::{CatalogService, ConsulClient, ConsulClientConfig};
pub use error::{ConsulError, Result};
pub use watcher::{ConsulWatcher, ConsulWatcherConfig, RefreshOutcome};
