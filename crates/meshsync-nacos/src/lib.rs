//! Nacos registry support for meshsync
//!
//! Nacos publishes complete ServiceEntries over an ADS stream carrying MCP
//! resources, so this watcher applies them directly instead of going
//! through an endpoint cache and the synchronizer.
//!
//! - `proto` - discovery, MCP and istio protobuf messages
//! - `node` - node identity sent to the discovery server
//! - `client` - stream lifecycle, response handling and acknowledgments
//! - `translate` - MCP resource to ServiceEntry
//! - `watcher` - the apply loop and the `RegistryWatcher` implementation

pub mod backoff;
pub mod client;
pub mod error;
pub mod node;
pub mod proto;
pub mod translate;
pub mod watcher;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use client::{AdsChannels, AdsClient, AdsClientConfig, GroupVersionKind, ResponseHandler, ServiceEntryOp};
pub use error::{AdsError, Result};
pub use node::NodeIdentity;
pub use watcher::{NacosWatcher, apply_loop};
