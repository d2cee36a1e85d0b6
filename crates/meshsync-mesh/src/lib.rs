//! Mesh-side model and reconciliation for meshsync
//!
//! This crate owns everything that talks about `ServiceEntry` resources:
//!
//! # Architecture
//!
//! - `model` - the `ServiceEntry` custom resource binding
//! - `builder` - desired-state construction from registry endpoints
//! - `cache` - endpoint snapshots written by watchers, read by the synchronizer
//! - `ownership` - classification of observed entries into ours/theirs
//! - `client` - Mesh API abstraction and its Kubernetes implementation
//! - `memory` - in-process Mesh API used for dry runs and tests
//! - `informer` - mesh change feed wired onto the ownership model
//! - `apply` - create-or-update/delete semantics for streamed entries
//! - `synchronizer` - periodic reconciliation with garbage collection
//! - `watcher` - the contract shared by all registry watchers

pub mod apply;
pub mod builder;
pub mod cache;
pub mod client;
pub mod error;
pub mod informer;
pub mod memory;
pub mod model;
pub mod ownership;
pub mod synchronizer;
pub mod watcher;

pub use builder::ServiceEntryBuilder;
pub use cache::{EndpointCache, HostEndpoints};
pub use client::{KubeMeshClient, MeshApi};
pub use error::{MeshError, Result};
pub use informer::ServiceEntryHandler;
pub use memory::InMemoryMeshApi;
pub use model::{Location, Port, Resolution, ServiceEntry, ServiceEntrySpec, WorkloadEntry};
pub use ownership::{Owner, OwnershipModel};
pub use synchronizer::{Synchronizer, SynchronizerConfig};
pub use watcher::RegistryWatcher;
