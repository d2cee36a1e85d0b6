//! Periodic reconciliation of cached registry endpoints into ServiceEntries
//!
//! Each tick diffs the endpoint cache against the ownership model, writes
//! the difference through the Mesh API and garbage-collects owned entries
//! whose host disappeared from the registry. Failures are logged and left
//! to the next tick.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use meshsync_common::constants::{DEFAULT_SYNC_INTERVAL_SECS, SYNCER_LABEL};
use meshsync_common::{RegistryKind, ShutdownSignal, formatted_name};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::builder::ServiceEntryBuilder;
use crate::cache::EndpointCache;
use crate::client::MeshApi;
use crate::error::Result;
use crate::model::{Location, ServiceEntry, WorkloadEntry};
use crate::ownership::{Owner, OwnershipModel};

/// Synchronizer configuration
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Namespace ServiceEntries are written to
    pub namespace: String,
    /// Only owned hosts with this prefix are garbage-collected
    pub prefix: String,
    /// Expected value of the ownership label on collectable entries
    pub registry: RegistryKind,
    pub location: Location,
    pub interval: Duration,
    /// Owner reference stamped on created entries
    pub owner: Option<OwnerReference>,
}

impl SynchronizerConfig {
    pub fn new(namespace: impl Into<String>, registry: RegistryKind) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: String::new(),
            registry,
            location: Location::MeshExternal,
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            owner: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner = owner;
        self
    }
}

/// Result of reconciling one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostAction {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Hosts owned by another actor
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct Synchronizer {
    config: SynchronizerConfig,
    builder: ServiceEntryBuilder,
    model: Arc<OwnershipModel>,
    cache: Arc<EndpointCache>,
    api: Arc<dyn MeshApi>,
}

impl Synchronizer {
    pub fn new(
        config: SynchronizerConfig,
        model: Arc<OwnershipModel>,
        cache: Arc<EndpointCache>,
        api: Arc<dyn MeshApi>,
    ) -> Self {
        let builder = ServiceEntryBuilder::new(config.namespace.clone(), config.registry)
            .with_location(config.location)
            .with_owner(config.owner.clone());
        Self {
            config,
            builder,
            model,
            cache,
            api,
        }
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    /// Reconcile every interval until shutdown, starting immediately.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        info!(
            namespace = %self.config.namespace,
            prefix = %self.config.prefix,
            registry = %self.config.registry,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting synchronizer"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(namespace = %self.config.namespace, "Synchronizer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.sync().await;
                    debug!(?report, "Reconciliation pass finished");
                }
            }
        }
    }

    /// One reconciliation pass.
    pub async fn sync(&self) -> SyncReport {
        let mut report = SyncReport::default();
        let ours = self.model.ours();

        for (host, endpoints) in self.cache.hosts() {
            let current = ours.get(&host).map(|entry| entry.as_ref());
            match self.create_or_update(&host, &endpoints, current).await {
                Ok(HostAction::Created) => report.created += 1,
                Ok(HostAction::Updated) => report.updated += 1,
                Ok(HostAction::Unchanged) => report.unchanged += 1,
                Ok(HostAction::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(host = %host, error = %e, "Failed to reconcile ServiceEntry");
                    report.failed += 1;
                }
            }
        }

        report.deleted = self.garbage_collect().await;
        report
    }

    /// `owned` is this host's entry in the ownership snapshot, if any.
    async fn create_or_update(
        &self,
        host: &str,
        endpoints: &[WorkloadEntry],
        owned: Option<&ServiceEntry>,
    ) -> Result<HostAction> {
        let name = formatted_name(host);
        let namespace = self.config.namespace.as_str();

        match owned {
            Some(entry) if entry.spec.endpoints.as_slice() == endpoints => {
                return Ok(HostAction::Unchanged);
            }
            Some(_) => {}
            None if self.model.classify(host) == Owner::Them => {
                debug!(host, "Host is owned by another controller, skipping");
                return Ok(HostAction::Skipped);
            }
            None => {}
        }

        let mut desired = self.builder.build(host, endpoints);

        match self.api.get(namespace, &name).await? {
            Some(current) => {
                desired.metadata.resource_version = current.metadata.resource_version;
                self.api.update(&desired).await?;
                info!(host, namespace, "Updated ServiceEntry");
                Ok(HostAction::Updated)
            }
            None => {
                self.api.create(&desired).await?;
                info!(host, namespace, "Created ServiceEntry");
                Ok(HostAction::Created)
            }
        }
    }

    /// Delete owned entries whose host left the registry; returns how many
    /// were deleted.
    async fn garbage_collect(&self) -> usize {
        let namespace = self.config.namespace.as_str();
        let expected_label = self.config.registry.as_str();
        let mut deleted = 0;

        for (host, entry) in self.model.ours() {
            if !host.starts_with(&self.config.prefix)
                || entry.namespace() != namespace
                || self.cache.contains(&host)
            {
                continue;
            }

            let name = entry.name();
            let current = match self.api.get(namespace, name).await {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(e) => {
                    warn!(host = %host, error = %e, "Failed to fetch ServiceEntry for garbage collection, skipping");
                    continue;
                }
            };

            if current.label(SYNCER_LABEL) != Some(expected_label) {
                debug!(host = %host, "ServiceEntry is not labelled for this registry, keeping");
                continue;
            }

            match self.api.delete(namespace, name).await {
                Ok(()) => {
                    info!(host = %host, namespace, "Garbage collected ServiceEntry");
                    deleted += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => error!(host = %host, error = %e, "Failed to delete ServiceEntry"),
            }
        }
        deleted
    }
}
