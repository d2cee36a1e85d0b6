//! Create-or-update and delete semantics for streamed ServiceEntries
//!
//! Entries arriving from the discovery stream are complete desired objects.
//! An existing object annotated with `update` is merged by endpoint address
//! instead of overwritten, which keeps endpoints other tools weighted by hand.

use meshsync_common::constants::{UPDATE_ANNOTATION, UPDATE_ANNOTATION_VALUE};
use tracing::{debug, info};

use crate::client::MeshApi;
use crate::error::Result;
use crate::model::{ServiceEntry, WorkloadEntry};

/// What an apply call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Delete target did not exist
    Absent,
}

/// Endpoints kept when merging `desired` into `existing`.
///
/// Existing endpoints whose weight is anything but 1 are preserved; desired
/// endpoints are appended unless a preserved endpoint has the same address.
pub fn merge_endpoints(existing: &[WorkloadEntry], desired: &[WorkloadEntry]) -> Vec<WorkloadEntry> {
    let mut merged: Vec<WorkloadEntry> = existing
        .iter()
        .filter(|e| e.weight != Some(1))
        .cloned()
        .collect();
    let preserved = merged.len();

    for endpoint in desired {
        if !merged[..preserved]
            .iter()
            .any(|kept| kept.address == endpoint.address)
        {
            merged.push(endpoint.clone());
        }
    }
    merged
}

/// Create `entry`, or update the existing object when its spec differs.
pub async fn create_or_update_service_entry(
    api: &dyn MeshApi,
    entry: &ServiceEntry,
) -> Result<ApplyOutcome> {
    let (namespace, name) = (entry.namespace(), entry.name());
    api.ensure_namespace(namespace).await?;

    let Some(mut existing) = api.get(namespace, name).await? else {
        api.create(entry).await?;
        info!(namespace, name, "Created ServiceEntry");
        return Ok(ApplyOutcome::Created);
    };

    let mut desired = entry.spec.clone();
    if existing.annotation(UPDATE_ANNOTATION).is_some() {
        if let Some(annotations) = existing.metadata.annotations.as_mut() {
            annotations.insert(
                UPDATE_ANNOTATION.to_string(),
                UPDATE_ANNOTATION_VALUE.to_string(),
            );
        }
        desired.endpoints = merge_endpoints(&existing.spec.endpoints, &entry.spec.endpoints);
    }

    if existing.spec == desired {
        debug!(namespace, name, "ServiceEntry unchanged");
        return Ok(ApplyOutcome::Unchanged);
    }

    existing.spec = desired;
    api.update(&existing).await?;
    info!(namespace, name, "Updated ServiceEntry");
    Ok(ApplyOutcome::Updated)
}

/// Delete `entry`; a missing object is not an error.
pub async fn delete_service_entry(api: &dyn MeshApi, entry: &ServiceEntry) -> Result<ApplyOutcome> {
    let (namespace, name) = (entry.namespace(), entry.name());
    if api.get(namespace, name).await?.is_none() {
        debug!(namespace, name, "ServiceEntry already absent");
        return Ok(ApplyOutcome::Absent);
    }

    match api.delete(namespace, name).await {
        Ok(()) => {
            info!(namespace, name, "Deleted ServiceEntry");
            Ok(ApplyOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => Ok(ApplyOutcome::Absent),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::memory::InMemoryMeshApi;
    use crate::model::ServiceEntrySpec;

    fn entry(name: &str, endpoints: Vec<WorkloadEntry>) -> ServiceEntry {
        let mut entry = ServiceEntry::new(
            name,
            ServiceEntrySpec {
                hosts: vec![format!("{}.nacos", name)],
                endpoints,
                ..Default::default()
            },
        );
        entry.metadata.namespace = Some("nacos".to_string());
        entry
    }

    #[test]
    fn test_merge_endpoints() {
        let existing = vec![
            WorkloadEntry::new("10.0.0.1").with_weight(5),
            WorkloadEntry::new("10.0.0.2").with_weight(1),
            WorkloadEntry::new("10.0.0.3"),
        ];
        let desired = vec![
            WorkloadEntry::new("10.0.0.1"),
            WorkloadEntry::new("10.0.0.2"),
            WorkloadEntry::new("10.0.0.4"),
        ];

        let merged = merge_endpoints(&existing, &desired);
        let addresses: Vec<&str> = merged.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.3", "10.0.0.2", "10.0.0.4"]);
        assert_eq!(merged[0].weight, Some(5));
        assert_eq!(merged[2].weight, None);
    }

    #[tokio::test]
    async fn test_create_then_unchanged_then_update() {
        let api = InMemoryMeshApi::new();
        let desired = entry("foo", vec![WorkloadEntry::new("10.0.0.1")]);

        let outcome = create_or_update_service_entry(&api, &desired).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);
        assert!(api.has_namespace("nacos"));

        let outcome = create_or_update_service_entry(&api, &desired).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);

        let changed = entry(
            "foo",
            vec![WorkloadEntry::new("10.0.0.1"), WorkloadEntry::new("10.0.0.2")],
        );
        let outcome = create_or_update_service_entry(&api, &changed).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(api.creates(), 1);
        assert_eq!(api.updates(), 1);
    }

    #[tokio::test]
    async fn test_update_annotation_merges() {
        let api = InMemoryMeshApi::new();
        let mut existing = entry("foo", vec![WorkloadEntry::new("10.0.0.1").with_weight(3)]);
        existing.metadata.annotations = Some(BTreeMap::from([(
            UPDATE_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
        api.seed(existing);

        let desired = entry(
            "foo",
            vec![WorkloadEntry::new("10.0.0.1"), WorkloadEntry::new("10.0.0.9")],
        );
        let outcome = create_or_update_service_entry(&api, &desired).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored = api.get("nacos", "foo").await.unwrap().unwrap();
        assert_eq!(stored.annotation(UPDATE_ANNOTATION), Some(UPDATE_ANNOTATION_VALUE));
        assert_eq!(stored.spec.endpoints.len(), 2);
        assert_eq!(stored.spec.endpoints[0].weight, Some(3));
        assert_eq!(stored.spec.endpoints[1].address, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let api = InMemoryMeshApi::new();
        let desired = entry("foo", vec![WorkloadEntry::new("10.0.0.1")]);
        create_or_update_service_entry(&api, &desired).await.unwrap();

        assert_eq!(
            delete_service_entry(&api, &desired).await.unwrap(),
            ApplyOutcome::Deleted
        );
        assert_eq!(
            delete_service_entry(&api, &desired).await.unwrap(),
            ApplyOutcome::Absent
        );
        assert_eq!(api.deletes(), 1);
    }
}
