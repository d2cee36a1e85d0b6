//! Consul polling watcher
//!
//! Polls the catalog on a fixed tick (first poll immediately), converts every
//! instance into an endpoint and replaces the endpoint cache with the
//! complete result. A failed catalog listing leaves the cache untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use meshsync_common::constants::{DEFAULT_CONSUL_POLL_INTERVAL_SECS, DEFAULT_CONSUL_WAIT_SECS};
use meshsync_common::{RegistryConfig, RegistryKind, ShutdownSignal, host_key};
use meshsync_mesh::builder::{dual_port_endpoint, endpoint};
use meshsync_mesh::{EndpointCache, HostEndpoints, RegistryWatcher, WorkloadEntry};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::{CatalogService, ConsulClient, ConsulClientConfig};
use crate::error::Result;

/// Polling settings shared by all Consul watchers of a process
#[derive(Debug, Clone)]
pub struct ConsulWatcherConfig {
    pub tick: Duration,
    pub wait: Duration,
    pub token: Option<String>,
}

impl Default for ConsulWatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(DEFAULT_CONSUL_POLL_INTERVAL_SECS),
            wait: Duration::from_secs(DEFAULT_CONSUL_WAIT_SECS),
            token: None,
        }
    }
}

/// What one poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The blocking query timed out without a catalog change
    Unchanged,
    /// The cache was replaced with this many hosts
    Refreshed(usize),
}

/// Endpoint for one catalog instance; `None` when it carries no address.
pub fn catalog_service_to_endpoint(service: &CatalogService) -> Option<WorkloadEntry> {
    let address = if service.service_address.is_empty() {
        service.address.as_str()
    } else {
        service.service_address.as_str()
    };

    if address.is_empty() {
        debug!(
            service = %service.service_name,
            id = %service.service_id,
            "Dropping consul instance without address"
        );
        return None;
    }

    Some(if service.service_port > 0 {
        endpoint(address, service.service_port)
    } else {
        dual_port_endpoint(address)
    })
}

pub struct ConsulWatcher {
    client: ConsulClient,
    cache: Arc<EndpointCache>,
    prefix: String,
    target_namespace: String,
    tick: Duration,
    last_index: AtomicU64,
}

impl ConsulWatcher {
    pub fn new(
        registry: &RegistryConfig,
        target_namespace: impl Into<String>,
        config: ConsulWatcherConfig,
    ) -> Result<Self> {
        let client = ConsulClient::new(
            ConsulClientConfig::new(&registry.endpoint)
                .with_namespace(&registry.source_namespace)
                .with_token(config.token)
                .with_wait(config.wait),
        )?;
        Ok(Self {
            client,
            cache: Arc::new(EndpointCache::new()),
            prefix: registry.prefix.clone(),
            target_namespace: target_namespace.into(),
            tick: config.tick,
            last_index: AtomicU64::new(0),
        })
    }

    /// Catalog index seen by the last successful listing.
    pub fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::SeqCst)
    }

    /// Poll the catalog once and replace the cache.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let last_index = self.last_index();
        let (services, index) = self.client.list_services(last_index).await?;
        if index == last_index {
            debug!(
                endpoint = %self.client.base_url(),
                index, "Consul catalog index unchanged"
            );
            return Ok(RefreshOutcome::Unchanged);
        }
        self.last_index.store(index, Ordering::SeqCst);

        let mut hosts: HostEndpoints = HashMap::new();
        for name in services.keys() {
            let instances = match self.client.service(name).await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!(service = %name, error = %e, "Failed to describe consul service");
                    continue;
                }
            };

            let endpoints: Vec<WorkloadEntry> = instances
                .iter()
                .filter_map(catalog_service_to_endpoint)
                .collect();
            if !endpoints.is_empty() {
                hosts
                    .entry(host_key(&self.prefix, name))
                    .or_default()
                    .extend(endpoints);
            }
        }

        let count = hosts.len();
        self.cache.set(hosts);
        debug!(hosts = count, index, "Refreshed consul endpoints");
        Ok(RefreshOutcome::Refreshed(count))
    }
}

#[async_trait]
impl RegistryWatcher for ConsulWatcher {
    async fn run(&self, shutdown: ShutdownSignal) {
        info!(
            endpoint = %self.client.base_url(),
            namespace = %self.client.namespace(),
            prefix = %self.prefix,
            "Starting consul watcher"
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.refresh() => {
                    if let Err(e) = result {
                        error!(endpoint = %self.client.base_url(), error = %e, "Failed to refresh consul catalog");
                    }
                }
            }
        }
        info!(endpoint = %self.client.base_url(), "Consul watcher stopped");
    }

    fn cache(&self) -> Option<Arc<EndpointCache>> {
        Some(self.cache.clone())
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::Consul
    }
}
