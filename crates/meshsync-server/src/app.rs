//! Component assembly
//!
//! ```text
//!   registry watchers ──> endpoint caches ──> synchronizers ──┐
//!   nacos watcher ──────────> apply loop ─────────────────────┤
//!                                                             v
//!   ownership model <──── change feed <──────────────────  Mesh API
//! ```
//!
//! Every watcher exposing a cache gets its own synchronizer. All units
//! share one ownership model and one shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use meshsync_common::shutdown::run_with_shutdown;
use meshsync_common::{RegistryKind, ShutdownSignal, SyncerConfig};
use meshsync_consul::{ConsulWatcher, ConsulWatcherConfig};
use meshsync_mesh::informer::ServiceEntryInformer;
use meshsync_mesh::ownership::owner_reference;
use meshsync_mesh::{
    InMemoryMeshApi, KubeMeshClient, MeshApi, OwnershipModel, RegistryWatcher, Synchronizer,
    SynchronizerConfig,
};
use meshsync_nacos::NacosWatcher;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Watchers and synchronizers built from the configuration
pub struct Components {
    pub watchers: Vec<Arc<dyn RegistryWatcher>>,
    pub synchronizers: Vec<Arc<Synchronizer>>,
    /// Discovery type updates of the streaming watcher, if any
    pub updates: Option<mpsc::Receiver<String>>,
}

pub struct App {
    config: SyncerConfig,
    model: Arc<OwnershipModel>,
    api: Arc<dyn MeshApi>,
    kube: Option<KubeMeshClient>,
}

impl App {
    /// Connect to the cluster, or set up the in-memory Mesh API for dry runs.
    pub async fn new(config: SyncerConfig) -> Result<Self> {
        let model = Arc::new(OwnershipModel::new(owner_reference(config.owner.as_ref())));

        if config.dry_run {
            info!("Dry run: ServiceEntries are kept in memory");
            let api = Arc::new(InMemoryMeshApi::new().with_handler(model.clone()));
            return Ok(Self::with_api(config, model, api));
        }

        let kube = KubeMeshClient::connect(config.kubeconfig.as_deref())
            .await
            .context("failed to create kubernetes client")?;
        let api: Arc<dyn MeshApi> = Arc::new(kube.clone());
        Ok(Self {
            config,
            model,
            api,
            kube: Some(kube),
        })
    }

    /// Use `api` as the Mesh API; it must feed `model` with its changes.
    pub fn with_api(config: SyncerConfig, model: Arc<OwnershipModel>, api: Arc<dyn MeshApi>) -> Self {
        Self {
            config,
            model,
            api,
            kube: None,
        }
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<OwnershipModel> {
        &self.model
    }

    pub fn build_components(&self) -> Result<Components> {
        let config = &self.config;
        let owner = config.owner.as_ref().map(|o| owner_reference(Some(o)));
        let mut watchers: Vec<Arc<dyn RegistryWatcher>> = Vec::new();
        let mut updates = None;

        for registry in config.active_registries() {
            let target = registry.target_namespace_or(&config.namespace);
            match registry.kind {
                RegistryKind::Consul => {
                    let watcher = ConsulWatcher::new(
                        &registry,
                        target,
                        ConsulWatcherConfig {
                            tick: Duration::from_secs(config.consul_poll_interval_secs.max(1)),
                            wait: Duration::from_secs(config.consul_wait_secs),
                            token: config.consul_token.clone(),
                        },
                    )
                    .with_context(|| format!("invalid consul registry {}", registry.endpoint))?;
                    watchers.push(Arc::new(watcher));
                }
                RegistryKind::Nacos => {
                    let watcher = NacosWatcher::new(&registry, target, &config.ads, self.api.clone())
                        .with_context(|| format!("invalid nacos registry {}", registry.endpoint))?;
                    updates = watcher.take_updates();
                    watchers.push(Arc::new(watcher));
                }
            }
        }

        let synchronizers = watchers
            .iter()
            .filter_map(|watcher| {
                let cache = watcher.cache()?;
                let sync_config = SynchronizerConfig::new(watcher.target_namespace(), watcher.kind())
                    .with_prefix(watcher.prefix())
                    .with_interval(Duration::from_secs(config.sync_interval_secs.max(1)))
                    .with_owner(owner.clone());
                Some(Arc::new(Synchronizer::new(
                    sync_config,
                    self.model.clone(),
                    cache,
                    self.api.clone(),
                )))
            })
            .collect();

        Ok(Components {
            watchers,
            synchronizers,
            updates,
        })
    }

    /// Create every watcher's target namespace; failures are logged.
    pub async fn ensure_namespaces(&self, watchers: &[Arc<dyn RegistryWatcher>]) {
        for watcher in watchers {
            let namespace = watcher.target_namespace();
            if let Err(e) = self.api.ensure_namespace(namespace).await {
                warn!(namespace, error = %e, "Failed to ensure target namespace");
            }
        }
    }

    /// Run every component until `shutdown` fires, then wait for them to stop.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<()> {
        info!(
            mesh_id = %self.config.mesh_id,
            region_id = %self.config.region_id,
            namespace = %self.config.namespace,
            registries = self.config.registries.len(),
            "Starting meshsync"
        );

        let components = self.build_components()?;
        if components.watchers.is_empty() {
            warn!("No registry configured, nothing to sync");
        }
        if run_with_shutdown(self.ensure_namespaces(&components.watchers), &shutdown)
            .await
            .is_none()
        {
            info!("Shutdown requested during startup");
            return Ok(());
        }

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if let Some(kube) = &self.kube {
            let informer = ServiceEntryInformer::new(self.model.clone());
            let api = kube.all_service_entries();
            let signal = shutdown.clone();
            handles.push(tokio::spawn(informer.run(api, signal)));
        }

        if let Some(mut updates) = components.updates {
            handles.push(tokio::spawn(async move {
                while let Some(type_url) = updates.recv().await {
                    if type_url.is_empty() {
                        warn!("Discovery client closed");
                        break;
                    }
                    info!(type_url = %type_url, "Discovery type synced");
                }
            }));
        }

        for watcher in components.watchers {
            let signal = shutdown.clone();
            handles.push(tokio::spawn(async move { watcher.run(signal).await }));
        }
        for synchronizer in components.synchronizers {
            let signal = shutdown.clone();
            handles.push(tokio::spawn(async move { synchronizer.run(signal).await }));
        }

        shutdown.cancelled().await;
        info!(tasks = handles.len(), "Waiting for components to stop");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Component task failed");
                    }
                }
            }
            Err(_) => warn!("Timed out waiting for components to stop"),
        }
        info!("meshsync stopped");
        Ok(())
    }
}
