//! Endpoint cache shared between a registry watcher and the synchronizer

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::WorkloadEntry;

/// Host name to endpoint list.
pub type HostEndpoints = HashMap<String, Vec<WorkloadEntry>>;

/// Snapshot store of host to endpoints.
///
/// Every `set` replaces the whole map; readers always get an owned copy of
/// a complete snapshot.
#[derive(Debug, Default)]
pub struct EndpointCache {
    hosts: RwLock<HostEndpoints>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn hosts(&self) -> HostEndpoints {
        self.hosts.read().clone()
    }

    /// Replace the whole snapshot.
    pub fn set(&self, hosts: HostEndpoints) {
        *self.hosts.write() = hosts;
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.read().contains_key(host)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::builder::endpoint;

    #[test]
    fn test_set_replaces_snapshot() {
        let cache = EndpointCache::new();
        cache.set(HashMap::from([
            ("a".to_string(), vec![endpoint("10.0.0.1", 80)]),
            ("b".to_string(), vec![endpoint("10.0.0.2", 80)]),
        ]));
        assert_eq!(cache.len(), 2);

        cache.set(HashMap::from([(
            "c".to_string(),
            vec![endpoint("10.0.0.3", 80)],
        )]));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("c"));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_hosts_is_isolated_copy() {
        let cache = EndpointCache::new();
        cache.set(HashMap::from([(
            "a".to_string(),
            vec![endpoint("10.0.0.1", 80)],
        )]));

        let mut snapshot = cache.hosts();
        snapshot.get_mut("a").unwrap().push(endpoint("10.0.0.9", 80));
        snapshot.insert("b".to_string(), vec![]);

        let fresh = cache.hosts();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh["a"].len(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_full_snapshots() {
        let cache = Arc::new(EndpointCache::new());
        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..200u32 {
                    let hosts: HostEndpoints = (0..10)
                        .map(|h| (format!("h{}", h), vec![endpoint("10.0.0.1", i)]))
                        .collect();
                    cache.set(hosts);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = cache.hosts();
            assert!(snapshot.is_empty() || snapshot.len() == 10);
            if let Some(first) = snapshot.values().next() {
                let port = first[0].ports.values().next().copied();
                assert!(snapshot.values().all(|e| e[0].ports.values().next().copied() == port));
            }
        }
        writer.join().unwrap();
    }

    proptest! {
        #[test]
        fn prop_set_then_hosts_round_trips(
            entries in proptest::collection::hash_map(
                "[a-z]{1,8}",
                proptest::collection::vec((any::<[u8; 4]>(), 1u32..65535), 0..4),
                0..6,
            )
        ) {
            let hosts: HostEndpoints = entries
                .into_iter()
                .map(|(host, eps)| {
                    let eps = eps
                        .into_iter()
                        .map(|(o, port)| endpoint(format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]), port))
                        .collect();
                    (host, eps)
                })
                .collect();

            let cache = EndpointCache::new();
            cache.set(hosts.clone());

            let mut first = cache.hosts();
            prop_assert_eq!(&first, &hosts);

            first.clear();
            prop_assert_eq!(cache.hosts(), hosts);
        }
    }
}
