//! Ownership model for observed ServiceEntries
//!
//! Mirrors the mesh API's own view of ServiceEntries and splits it into
//! entries this controller may manage ("ours") and entries owned by some
//! other actor ("theirs"). An entry with N hosts occupies N slots. Entries
//! without owner references are adoptable and land in "ours".

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use meshsync_common::OwnerConfig;
use meshsync_common::constants::{DEFAULT_OWNER_API_VERSION, DEFAULT_OWNER_KIND};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::informer::ServiceEntryHandler;
use crate::model::ServiceEntry;

/// Who manages a ServiceEntry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Owned by this controller
    Us,
    /// Owned by another controller
    Them,
    /// No owner reference at all
    None,
}

/// Owner reference this controller identifies itself with.
pub fn owner_reference(config: Option<&OwnerConfig>) -> OwnerReference {
    match config {
        Some(owner) => OwnerReference {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            controller: Some(true),
            block_owner_deletion: None,
        },
        None => OwnerReference {
            api_version: DEFAULT_OWNER_API_VERSION.to_string(),
            kind: DEFAULT_OWNER_KIND.to_string(),
            controller: Some(true),
            ..Default::default()
        },
    }
}

/// Field-by-field owner reference comparison.
fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.api_version == b.api_version
        && a.kind == b.kind
        && a.name == b.name
        && a.uid == b.uid
        && a.controller == b.controller
        && a.block_owner_deletion == b.block_owner_deletion
}

#[derive(Debug, Default)]
struct Entries {
    ours: HashMap<String, Arc<ServiceEntry>>,
    theirs: HashMap<String, Arc<ServiceEntry>>,
}

impl Entries {
    fn insert(&mut self, owner: Owner, entry: Arc<ServiceEntry>) {
        let target = match owner {
            Owner::Us | Owner::None => &mut self.ours,
            Owner::Them => &mut self.theirs,
        };
        for host in &entry.spec.hosts {
            target.insert(host.clone(), entry.clone());
        }
    }

    fn remove(&mut self, owner: Owner, entry: &ServiceEntry) {
        for host in &entry.spec.hosts {
            match owner {
                Owner::Us => {
                    self.ours.remove(host);
                }
                Owner::Them => {
                    self.theirs.remove(host);
                }
                Owner::None => {
                    self.ours.remove(host);
                    self.theirs.remove(host);
                }
            }
        }
    }
}

/// In-memory classification of every ServiceEntry known to the cluster.
#[derive(Debug)]
pub struct OwnershipModel {
    reference: OwnerReference,
    entries: RwLock<Entries>,
}

impl OwnershipModel {
    pub fn new(reference: OwnerReference) -> Self {
        Self {
            reference,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// The reference this controller stamps on entries it creates.
    pub fn owner_reference(&self) -> &OwnerReference {
        &self.reference
    }

    /// Owner of `entry` as judged by its owner references.
    pub fn owner_of(&self, entry: &ServiceEntry) -> Owner {
        match entry.metadata.owner_references.as_deref() {
            None | Some([]) => Owner::None,
            Some(refs) if refs.iter().any(|r| same_owner(r, &self.reference)) => Owner::Us,
            Some(_) => Owner::Them,
        }
    }

    pub fn classify(&self, host: &str) -> Owner {
        let entries = self.entries.read();
        if entries.ours.contains_key(host) {
            Owner::Us
        } else if entries.theirs.contains_key(host) {
            Owner::Them
        } else {
            Owner::None
        }
    }

    /// Snapshot of hosts this controller may manage.
    pub fn ours(&self) -> HashMap<String, Arc<ServiceEntry>> {
        self.entries.read().ours.clone()
    }

    /// Snapshot of hosts owned by someone else.
    pub fn theirs(&self) -> HashMap<String, Arc<ServiceEntry>> {
        self.entries.read().theirs.clone()
    }

    pub fn insert(&self, entry: &ServiceEntry) {
        let owner = self.owner_of(entry);
        debug!(
            name = %entry.name(),
            namespace = %entry.namespace(),
            hosts = ?entry.spec.hosts,
            ?owner,
            "Inserting ServiceEntry"
        );
        self.entries
            .write()
            .insert(owner, Arc::new(entry.clone()));
    }

    /// Replace `old` with `new`; a no-op when the spec did not change.
    pub fn update(&self, old: &ServiceEntry, new: &ServiceEntry) {
        if old.spec == new.spec {
            info!(
                name = %new.name(),
                namespace = %new.namespace(),
                "Skipping update, no change"
            );
            return;
        }

        let old_owner = self.owner_of(old);
        let new_owner = self.owner_of(new);
        debug!(
            name = %new.name(),
            namespace = %new.namespace(),
            old_hosts = ?old.spec.hosts,
            new_hosts = ?new.spec.hosts,
            ?old_owner,
            ?new_owner,
            "Updating ServiceEntry"
        );

        let mut entries = self.entries.write();
        entries.remove(old_owner, old);
        entries.insert(new_owner, Arc::new(new.clone()));
    }

    pub fn delete(&self, entry: &ServiceEntry) {
        let owner = self.owner_of(entry);
        debug!(
            name = %entry.name(),
            namespace = %entry.namespace(),
            hosts = ?entry.spec.hosts,
            ?owner,
            "Deleting ServiceEntry"
        );
        self.entries.write().remove(owner, entry);
    }
}

impl ServiceEntryHandler for OwnershipModel {
    fn on_add(&self, entry: &ServiceEntry) {
        self.insert(entry);
    }

    fn on_update(&self, old: &ServiceEntry, new: &ServiceEntry) {
        self.update(old, new);
    }

    fn on_delete(&self, entry: &ServiceEntry) {
        self.delete(entry);
    }
}
