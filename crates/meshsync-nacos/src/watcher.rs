//! Streaming Nacos watcher
//!
//! Runs the discovery receive loop and the apply loop side by side. The two
//! are joined by the client's bounded op queue; closing the client closes
//! the queue, which ends the apply loop once it has drained.

use std::sync::Arc;

use async_trait::async_trait;
use meshsync_common::{AdsSettings, RegistryConfig, RegistryKind, ShutdownSignal};
use meshsync_mesh::apply::{create_or_update_service_entry, delete_service_entry};
use meshsync_mesh::{EndpointCache, MeshApi, RegistryWatcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{AdsClient, AdsClientConfig, ServiceEntryOp};
use crate::error::Result;

/// Apply queued operations one at a time, in submission order.
///
/// Returns when the queue is closed and empty, or on shutdown.
pub async fn apply_loop(
    api: Arc<dyn MeshApi>,
    mut ops: mpsc::Receiver<ServiceEntryOp>,
    shutdown: ShutdownSignal,
) {
    loop {
        let op = tokio::select! {
            _ = shutdown.cancelled() => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };

        let entry = op.entry();
        let (namespace, name) = (entry.namespace(), entry.name());
        match &op {
            ServiceEntryOp::Upsert(entry) => match create_or_update_service_entry(api.as_ref(), entry).await {
                Ok(outcome) => debug!(namespace, name, ?outcome, "Applied ServiceEntry"),
                Err(e) => error!(namespace, name, error = %e, "Failed to create or update ServiceEntry"),
            },
            ServiceEntryOp::Delete(entry) => match delete_service_entry(api.as_ref(), entry).await {
                Ok(outcome) => debug!(namespace, name, ?outcome, "Removed ServiceEntry"),
                Err(e) => error!(namespace, name, error = %e, "Failed to delete ServiceEntry"),
            },
        }
    }
    debug!("Apply loop stopped");
}

pub struct NacosWatcher {
    client: AdsClient,
    api: Arc<dyn MeshApi>,
    target_namespace: String,
    ops: Mutex<Option<mpsc::Receiver<ServiceEntryOp>>>,
    updates: Mutex<Option<mpsc::Receiver<String>>>,
}

impl NacosWatcher {
    pub fn new(
        registry: &RegistryConfig,
        target_namespace: impl Into<String>,
        settings: &AdsSettings,
        api: Arc<dyn MeshApi>,
    ) -> Result<Self> {
        Self::with_config(
            AdsClientConfig::from_settings(&registry.endpoint, settings),
            target_namespace,
            api,
        )
    }

    pub fn with_config(
        config: AdsClientConfig,
        target_namespace: impl Into<String>,
        api: Arc<dyn MeshApi>,
    ) -> Result<Self> {
        let (client, channels) = AdsClient::new(config)?;
        Ok(Self {
            client,
            api,
            target_namespace: target_namespace.into(),
            ops: Mutex::new(Some(channels.ops)),
            updates: Mutex::new(Some(channels.updates)),
        })
    }

    pub fn client(&self) -> &AdsClient {
        &self.client
    }

    /// Type-update notifications; available once.
    pub fn take_updates(&self) -> Option<mpsc::Receiver<String>> {
        self.updates.lock().take()
    }
}

#[async_trait]
impl RegistryWatcher for NacosWatcher {
    async fn run(&self, shutdown: ShutdownSignal) {
        let Some(ops) = self.ops.lock().take() else {
            warn!(address = %self.client.address(), "Nacos watcher already running");
            return;
        };
        info!(
            address = %self.client.address(),
            node = %self.client.node_id(),
            "Starting nacos watcher"
        );

        tokio::join!(
            self.client.run(&shutdown),
            apply_loop(self.api.clone(), ops, shutdown.clone()),
        );
        info!(address = %self.client.address(), "Nacos watcher stopped");
    }

    fn cache(&self) -> Option<Arc<EndpointCache>> {
        None
    }

    fn prefix(&self) -> &str {
        ""
    }

    fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::Nacos
    }
}
