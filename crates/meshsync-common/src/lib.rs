//! Shared building blocks for meshsync
//!
//! - `config` - registry and process configuration
//! - `error` - configuration errors
//! - `naming` - host name canonicalization
//! - `constants` - labels, annotations and defaults shared across crates
//! - `shutdown` - cooperative cancellation shared by every loop

pub mod config;
pub mod constants;
pub mod error;
pub mod naming;
pub mod shutdown;

pub use config::{AdsSettings, LogSettings, OwnerConfig, RegistryConfig, RegistryKind, SyncerConfig};
pub use error::{ConfigError, Result};
pub use naming::{formatted_name, host_key, is_ip_address};
pub use shutdown::ShutdownSignal;
