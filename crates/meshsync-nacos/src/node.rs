//! Node identity sent with every discovery request

use std::collections::BTreeMap;

use if_addrs::IfAddr;
use meshsync_common::AdsSettings;
use prost_types::value::Kind;
use prost_types::{Struct, Value};

use crate::proto::{Locality, Node};

pub const ISTIO_VERSION_KEY: &str = "ISTIO_VERSION";
pub const DEFAULT_ISTIO_VERSION: &str = "65536.65536.65536";

/// `{node_type}~{ip}~{workload}.{namespace}~{namespace}.svc.cluster.local`
pub fn node_id(node_type: &str, ip: &str, workload: &str, namespace: &str) -> String {
    format!(
        "{}~{}~{}.{}~{}.svc.cluster.local",
        node_type, ip, workload, namespace, namespace
    )
}

/// First non-loopback IPv4 address of this host, or `0.0.0.0`.
pub fn private_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Parse `region/zone/sub_zone`; missing trailing parts stay empty.
pub fn parse_locality(raw: &str) -> Option<Locality> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut parts = raw.splitn(3, '/');
    Some(Locality {
        region: parts.next().unwrap_or_default().to_string(),
        zone: parts.next().unwrap_or_default().to_string(),
        sub_zone: parts.next().unwrap_or_default().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeIdentity {
    id: String,
    locality: Option<Locality>,
    metadata: BTreeMap<String, String>,
}

impl NodeIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            ISTIO_VERSION_KEY.to_string(),
            DEFAULT_ISTIO_VERSION.to_string(),
        );
        Self {
            id: id.into(),
            locality: None,
            metadata,
        }
    }

    pub fn from_settings(settings: &AdsSettings) -> Self {
        let ip = settings
            .ip
            .clone()
            .filter(|ip| !ip.is_empty())
            .unwrap_or_else(private_ip);
        let id = node_id(
            &settings.node_type,
            &ip,
            &settings.workload,
            &settings.namespace,
        );

        let mut identity = Self::new(id);
        identity.locality = settings.locality.as_deref().and_then(parse_locality);
        // Configured metadata may override the default version
        identity.metadata.extend(
            settings
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        identity
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn to_node(&self) -> Node {
        let fields = self
            .metadata
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Value {
                        kind: Some(Kind::StringValue(v.clone())),
                    },
                )
            })
            .collect();
        Node {
            id: self.id.clone(),
            metadata: Some(Struct { fields }),
            locality: self.locality.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field(node: &Node, key: &str) -> Option<String> {
        match node.metadata.as_ref()?.fields.get(key)?.kind.as_ref()? {
            Kind::StringValue(v) => Some(v.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_node_id() {
        assert_eq!(
            node_id("sidecar", "10.0.0.5", "test-1", "default"),
            "sidecar~10.0.0.5~test-1.default~default.svc.cluster.local"
        );
    }

    #[test]
    fn test_from_default_settings() {
        let settings = AdsSettings {
            ip: Some("10.1.2.3".to_string()),
            ..Default::default()
        };
        let identity = NodeIdentity::from_settings(&settings);
        assert_eq!(
            identity.id(),
            "sidecar~10.1.2.3~test-1.default~default.svc.cluster.local"
        );

        let node = identity.to_node();
        assert_eq!(
            string_field(&node, ISTIO_VERSION_KEY).as_deref(),
            Some(DEFAULT_ISTIO_VERSION)
        );
        assert!(node.locality.is_none());
    }

    #[test]
    fn test_configured_metadata_and_locality() {
        let mut settings = AdsSettings {
            ip: Some("10.1.2.3".to_string()),
            locality: Some("cn-hangzhou/cn-hangzhou-b".to_string()),
            ..Default::default()
        };
        settings
            .metadata
            .insert(ISTIO_VERSION_KEY.to_string(), "1.22.0".to_string());
        settings
            .metadata
            .insert("CLUSTER_ID".to_string(), "c1".to_string());

        let node = NodeIdentity::from_settings(&settings).to_node();
        assert_eq!(string_field(&node, ISTIO_VERSION_KEY).as_deref(), Some("1.22.0"));
        assert_eq!(string_field(&node, "CLUSTER_ID").as_deref(), Some("c1"));

        let locality = node.locality.unwrap();
        assert_eq!(locality.region, "cn-hangzhou");
        assert_eq!(locality.zone, "cn-hangzhou-b");
        assert_eq!(locality.sub_zone, "");
    }

    #[test]
    fn test_parse_locality_empty() {
        assert!(parse_locality("  ").is_none());
    }

    #[test]
    fn test_private_ip_is_not_loopback() {
        assert_ne!(private_ip(), "127.0.0.1");
    }
}
