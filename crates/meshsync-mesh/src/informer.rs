//! Mesh change feed
//!
//! Watches ServiceEntries across all namespaces and turns the watch stream
//! into add/update/delete callbacks. A local store keyed by `namespace/name`
//! supplies the previous object for updates and detects deletions missed
//! while the watch was re-listing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use kube::Api;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use meshsync_common::ShutdownSignal;
use tracing::{debug, info, warn};

use crate::model::ServiceEntry;

/// Receiver of mesh change notifications
pub trait ServiceEntryHandler: Send + Sync {
    fn on_add(&self, entry: &ServiceEntry);
    fn on_update(&self, old: &ServiceEntry, new: &ServiceEntry);
    fn on_delete(&self, entry: &ServiceEntry);
}

fn store_key(entry: &ServiceEntry) -> String {
    format!("{}/{}", entry.namespace(), entry.name())
}

/// Translates watch events into handler callbacks.
pub struct ServiceEntryInformer {
    handler: Arc<dyn ServiceEntryHandler>,
    store: HashMap<String, ServiceEntry>,
    relisted: Option<HashSet<String>>,
}

impl ServiceEntryInformer {
    pub fn new(handler: Arc<dyn ServiceEntryHandler>) -> Self {
        Self {
            handler,
            store: HashMap::new(),
            relisted: None,
        }
    }

    /// Number of objects currently known.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn handle_event(&mut self, event: Event<ServiceEntry>) {
        match event {
            Event::Init => {
                debug!("ServiceEntry watch (re)listing");
                self.relisted = Some(HashSet::new());
            }
            Event::InitApply(entry) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(store_key(&entry));
                }
                self.apply(entry);
            }
            Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let stale: Vec<String> = self
                    .store
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                for key in stale {
                    if let Some(entry) = self.store.remove(&key) {
                        self.handler.on_delete(&entry);
                    }
                }
                info!(count = self.store.len(), "ServiceEntry watch synced");
            }
            Event::Apply(entry) => self.apply(entry),
            Event::Delete(entry) => {
                self.store.remove(&store_key(&entry));
                self.handler.on_delete(&entry);
            }
        }
    }

    fn apply(&mut self, entry: ServiceEntry) {
        let key = store_key(&entry);
        match self.store.get(&key) {
            Some(old) => {
                if old.metadata.resource_version != entry.metadata.resource_version
                    || old.spec != entry.spec
                {
                    self.handler.on_update(old, &entry);
                }
            }
            None => self.handler.on_add(&entry),
        }
        self.store.insert(key, entry);
    }

    /// Watch ServiceEntries in every namespace until shutdown.
    pub async fn run(mut self, api: Api<ServiceEntry>, shutdown: ShutdownSignal) {
        info!("Starting ServiceEntry watcher");

        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("ServiceEntry watcher stopped");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => warn!(error = %e, "ServiceEntry watch error"),
                    None => {
                        warn!("ServiceEntry watch stream ended");
                        break;
                    }
                }
            }
        }
    }
}
