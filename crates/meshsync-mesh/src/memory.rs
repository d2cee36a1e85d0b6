//! In-process Mesh API
//!
//! Keeps ServiceEntries in memory with Kubernetes-like semantics (resource
//! versions, conflicts, namespaces must exist) and optionally feeds every
//! change to a [`ServiceEntryHandler`], standing in for the watch feed.
//! Used by dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::client::MeshApi;
use crate::error::{MeshError, Result};
use crate::informer::ServiceEntryHandler;
use crate::model::ServiceEntry;

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryMeshApi {
    entries: RwLock<BTreeMap<Key, ServiceEntry>>,
    namespaces: RwLock<BTreeSet<String>>,
    handler: Option<Arc<dyn ServiceEntryHandler>>,
    version: AtomicU64,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryMeshApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every change to `handler`, as the mesh watch feed would.
    pub fn with_handler(mut self, handler: Arc<dyn ServiceEntryHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_namespaces<I, S>(self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces
            .write()
            .extend(namespaces.into_iter().map(Into::into));
        self
    }

    /// Make every call fail until reset, as during an API outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Store `entry` directly, bypassing the call counters.
    pub fn seed(&self, mut entry: ServiceEntry) {
        entry.metadata.resource_version = Some(self.next_version());
        let key = (entry.namespace().to_string(), entry.name().to_string());
        self.namespaces.write().insert(key.0.clone());
        self.entries.write().insert(key, entry.clone());
        if let Some(handler) = &self.handler {
            handler.on_add(&entry);
        }
    }

    pub fn entries(&self) -> Vec<ServiceEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.read().contains(namespace)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MeshError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn key_of(entry: &ServiceEntry) -> Result<Key> {
        let (namespace, name) = (entry.namespace(), entry.name());
        if namespace.is_empty() || name.is_empty() {
            return Err(MeshError::InvalidObject(
                "ServiceEntry requires a name and a namespace".to_string(),
            ));
        }
        Ok((namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl MeshApi for InMemoryMeshApi {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceEntry>> {
        self.check_available()?;
        Ok(self
            .entries
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, entry: &ServiceEntry) -> Result<ServiceEntry> {
        self.check_available()?;
        let key = Self::key_of(entry)?;
        if !self.has_namespace(&key.0) {
            return Err(MeshError::NotFound {
                kind: "Namespace",
                namespace: key.0.clone(),
                name: key.0,
            });
        }

        let mut created = entry.clone();
        created.metadata.resource_version = Some(self.next_version());
        {
            let mut entries = self.entries.write();
            if entries.contains_key(&key) {
                return Err(MeshError::AlreadyExists {
                    kind: "ServiceEntry",
                    namespace: key.0,
                    name: key.1,
                });
            }
            entries.insert(key.clone(), created.clone());
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        info!(namespace = %key.0, name = %key.1, "[dry-run] created ServiceEntry");

        if let Some(handler) = &self.handler {
            handler.on_add(&created);
        }
        Ok(created)
    }

    async fn update(&self, entry: &ServiceEntry) -> Result<ServiceEntry> {
        self.check_available()?;
        let key = Self::key_of(entry)?;

        let mut updated = entry.clone();
        let old = {
            let mut entries = self.entries.write();
            let Some(current) = entries.get(&key) else {
                return Err(MeshError::NotFound {
                    kind: "ServiceEntry",
                    namespace: key.0,
                    name: key.1,
                });
            };
            if current.metadata.resource_version != entry.metadata.resource_version {
                return Err(MeshError::Conflict {
                    namespace: key.0,
                    name: key.1,
                    resource_version: entry.metadata.resource_version.clone(),
                });
            }
            updated.metadata.resource_version = Some(self.next_version());
            entries.insert(key.clone(), updated.clone())
        };
        self.updates.fetch_add(1, Ordering::SeqCst);
        info!(namespace = %key.0, name = %key.1, "[dry-run] updated ServiceEntry");

        if let (Some(handler), Some(old)) = (&self.handler, old) {
            handler.on_update(&old, &updated);
        }
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_available()?;
        let removed = self
            .entries
            .write()
            .remove(&(namespace.to_string(), name.to_string()));
        let Some(removed) = removed else {
            return Err(MeshError::NotFound {
                kind: "ServiceEntry",
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        self.deletes.fetch_add(1, Ordering::SeqCst);
        info!(namespace, name, "[dry-run] deleted ServiceEntry");

        if let Some(handler) = &self.handler {
            handler.on_delete(&removed);
        }
        Ok(())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.check_available()?;
        if self.namespaces.write().insert(namespace.to_string()) {
            info!(namespace, "[dry-run] created namespace");
        }
        Ok(())
    }
}
