//! Contract shared by all registry watchers
//!
//! Polling watchers publish endpoint snapshots through their cache and rely
//! on a [`Synchronizer`](crate::Synchronizer) to reconcile them; streaming
//! watchers apply ServiceEntries themselves and expose no cache. Only one
//! kind of watcher runs per process, which configuration validation enforces.

use std::sync::Arc;

use async_trait::async_trait;
use meshsync_common::{RegistryKind, ShutdownSignal};

use crate::cache::EndpointCache;

#[async_trait]
pub trait RegistryWatcher: Send + Sync {
    /// Run until `shutdown` fires.
    async fn run(&self, shutdown: ShutdownSignal);

    /// Endpoint snapshots for the synchronizer, if this watcher produces any.
    fn cache(&self) -> Option<Arc<EndpointCache>>;

    /// Prefix of every host this watcher produces.
    fn prefix(&self) -> &str;

    /// Namespace the resulting ServiceEntries live in.
    fn target_namespace(&self) -> &str;

    fn kind(&self) -> RegistryKind;
}
