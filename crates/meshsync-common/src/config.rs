//! Registry and process configuration
//!
//! The process configuration is deserialized from the layered sources the
//! server assembles (config file, environment, command line). The registry
//! list may also come from the legacy JSON registry file, which uses the
//! camelCase keys `type`, `endpoint`, `consulNamespace`, `prefix` and
//! `toNamespace`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_APPLY_QUEUE_CAPACITY, DEFAULT_CONSUL_POLL_INTERVAL_SECS, DEFAULT_CONSUL_WAIT_SECS,
    DEFAULT_NAMESPACE, DEFAULT_OWNER_API_VERSION, DEFAULT_OWNER_KIND, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::error::{ConfigError, Result};

/// External registry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegistryKind {
    /// Consul catalog, polled
    Consul,
    /// Nacos / Pilot discovery feed, streamed over ADS
    Nacos,
}

impl RegistryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Consul => "consul",
            RegistryKind::Nacos => "nacos",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consul" => Ok(RegistryKind::Consul),
            "nacos" => Ok(RegistryKind::Nacos),
            _ => Err(ConfigError::UnsupportedRegistry(s.to_string())),
        }
    }
}

impl TryFrom<String> for RegistryKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RegistryKind> for String {
    fn from(kind: RegistryKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One configured external registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(rename = "type")]
    pub kind: RegistryKind,
    /// Registry address, e.g. `http://consul:8500` or `nacos:18848`
    #[serde(default)]
    pub endpoint: String,
    /// Namespace inside the registry (Consul enterprise namespace)
    #[serde(default, alias = "consulNamespace", alias = "sourceNamespace")]
    pub source_namespace: String,
    /// Prefix prepended to every host produced by this registry
    #[serde(default, alias = "hostPrefix")]
    pub prefix: String,
    /// Mesh namespace the generated ServiceEntries are written to
    #[serde(default, alias = "toNamespace", alias = "targetNamespace")]
    pub target_namespace: String,
}

impl RegistryConfig {
    pub fn new(kind: RegistryKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            source_namespace: String::new(),
            prefix: String::new(),
            target_namespace: String::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_source_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.source_namespace = namespace.into();
        self
    }

    pub fn with_target_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.target_namespace = namespace.into();
        self
    }

    /// Target namespace, falling back to `default_namespace` when unset.
    pub fn target_namespace_or(&self, default_namespace: &str) -> String {
        if self.target_namespace.is_empty() {
            default_namespace.to_string()
        } else {
            self.target_namespace.clone()
        }
    }
}

/// Owner reference stamped on ServiceEntries created by this controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConfig {
    #[serde(default = "default_owner_api_version")]
    pub api_version: String,
    #[serde(default = "default_owner_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

fn default_owner_api_version() -> String {
    DEFAULT_OWNER_API_VERSION.to_string()
}

fn default_owner_kind() -> String {
    DEFAULT_OWNER_KIND.to_string()
}

/// Settings for the ADS discovery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsSettings {
    /// Namespace used in the node identity
    #[serde(default = "default_ads_namespace")]
    pub namespace: String,
    #[serde(default = "default_node_type")]
    pub node_type: String,
    #[serde(default = "default_workload")]
    pub workload: String,
    /// Node IP; the first non-loopback interface address when unset
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Path prefix for the persisted mesh config (`<dir>_mesh.json`)
    #[serde(default)]
    pub local_cache_dir: Option<String>,
    /// Reconnect with exponential backoff after a stream failure
    #[serde(default = "default_true")]
    pub reconnect: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AdsSettings {
    fn default() -> Self {
        Self {
            namespace: default_ads_namespace(),
            node_type: default_node_type(),
            workload: default_workload(),
            ip: None,
            locality: None,
            metadata: HashMap::new(),
            local_cache_dir: None,
            reconnect: true,
            queue_capacity: DEFAULT_APPLY_QUEUE_CAPACITY,
        }
    }
}

fn default_ads_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_node_type() -> String {
    "sidecar".to_string()
}

fn default_workload() -> String {
    "test-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    DEFAULT_APPLY_QUEUE_CAPACITY
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling log files; file output is off when unset
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            console: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncerConfig {
    #[serde(default)]
    pub mesh_id: String,
    #[serde(default)]
    pub region_id: String,
    /// Namespace the controller publishes into when a registry names none
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_consul_poll_interval_secs")]
    pub consul_poll_interval_secs: u64,
    #[serde(default = "default_consul_wait_secs")]
    pub consul_wait_secs: u64,
    #[serde(default)]
    pub consul_token: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Kubeconfig file for the mesh cluster; ambient configuration when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub owner: Option<OwnerConfig>,
    #[serde(default)]
    pub ads: AdsSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            mesh_id: String::new(),
            region_id: String::new(),
            namespace: String::new(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            consul_poll_interval_secs: DEFAULT_CONSUL_POLL_INTERVAL_SECS,
            consul_wait_secs: DEFAULT_CONSUL_WAIT_SECS,
            consul_token: None,
            debug: false,
            dry_run: false,
            kubeconfig: None,
            owner: None,
            ads: AdsSettings::default(),
            log: LogSettings::default(),
            registries: Vec::new(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn default_consul_poll_interval_secs() -> u64 {
    DEFAULT_CONSUL_POLL_INTERVAL_SECS
}

fn default_consul_wait_secs() -> u64 {
    DEFAULT_CONSUL_WAIT_SECS
}

impl SyncerConfig {
    /// Check the invariants every startup path relies on.
    pub fn validate(&self) -> Result<()> {
        if self.mesh_id.trim().is_empty() {
            return Err(ConfigError::MissingMeshId);
        }

        for (index, registry) in self.registries.iter().enumerate() {
            if registry.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingEndpoint {
                    index,
                    kind: registry.kind,
                });
            }
        }

        self.registry_kind().map(|_| ())
    }

    /// The single registry kind configured, or `None` when no registry is set.
    pub fn registry_kind(&self) -> Result<Option<RegistryKind>> {
        let mut kinds = self.registries.iter().map(|r| r.kind);
        let Some(first) = kinds.next() else {
            return Ok(None);
        };
        match kinds.find(|kind| *kind != first) {
            Some(other) => Err(ConfigError::MixedRegistries(first, other)),
            None => Ok(Some(first)),
        }
    }

    /// Registries that will actually be run.
    ///
    /// Only one streaming registry is supported per process; extra entries
    /// are ignored with a warning.
    pub fn active_registries(&self) -> Vec<RegistryConfig> {
        let mut active = Vec::with_capacity(self.registries.len());
        let mut nacos_seen = false;
        for registry in &self.registries {
            if registry.kind == RegistryKind::Nacos {
                if nacos_seen {
                    warn!(
                        endpoint = %registry.endpoint,
                        "Only one nacos registry is supported, ignoring"
                    );
                    continue;
                }
                nacos_seen = true;
            }
            active.push(registry.clone());
        }
        active
    }

    /// Namespace to publish into: configured value, then
    /// `publish_namespace`, then `pod_namespace`, then `default`.
    pub fn resolve_namespace(
        &self,
        publish_namespace: Option<String>,
        pod_namespace: Option<String>,
    ) -> String {
        if !self.namespace.is_empty() {
            return self.namespace.clone();
        }
        publish_namespace
            .filter(|ns| !ns.is_empty())
            .or_else(|| pod_namespace.filter(|ns| !ns.is_empty()))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }
}

/// Parse the legacy JSON registry list.
pub fn parse_registry_list(content: &str) -> Result<Vec<RegistryConfig>> {
    Ok(serde_json::from_str(content)?)
}

/// Read the legacy JSON registry list from `path`.
pub fn load_registry_file(path: impl AsRef<Path>) -> Result<Vec<RegistryConfig>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_registry_list(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(registries: Vec<RegistryConfig>) -> SyncerConfig {
        SyncerConfig {
            mesh_id: "mesh-1".to_string(),
            registries,
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_kind_parse() {
        assert_eq!("consul".parse::<RegistryKind>().unwrap(), RegistryKind::Consul);
        assert_eq!("Nacos".parse::<RegistryKind>().unwrap(), RegistryKind::Nacos);
        assert!(matches!(
            "eureka".parse::<RegistryKind>(),
            Err(ConfigError::UnsupportedRegistry(_))
        ));
    }

    #[test]
    fn test_parse_legacy_registry_list() {
        let content = r#"[
            {"type": "consul", "endpoint": "http://consul:8500", "consulNamespace": "team-a",
             "prefix": "svc-", "toNamespace": "external"},
            {"type": "consul", "endpoint": "http://consul-2:8500"}
        ]"#;
        let registries = parse_registry_list(content).unwrap();
        assert_eq!(registries.len(), 2);
        assert_eq!(registries[0].kind, RegistryKind::Consul);
        assert_eq!(registries[0].source_namespace, "team-a");
        assert_eq!(registries[0].prefix, "svc-");
        assert_eq!(registries[0].target_namespace, "external");
        assert_eq!(registries[1].prefix, "");
    }

    #[test]
    fn test_parse_unsupported_type() {
        let content = r#"[{"type": "zookeeper", "endpoint": "zk:2181"}]"#;
        let err = parse_registry_list(content).unwrap_err();
        assert!(err.to_string().contains("unsupported registry type"));
    }

    #[test]
    fn test_load_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RegistryConfig");
        std::fs::write(&path, r#"[{"type": "nacos", "endpoint": "nacos:18848"}]"#).unwrap();

        let registries = load_registry_file(&path).unwrap();
        assert_eq!(registries[0].kind, RegistryKind::Nacos);

        let missing = load_registry_file(dir.path().join("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_validate_requires_mesh_id() {
        let config = SyncerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingMeshId)));
    }

    #[test]
    fn test_validate_rejects_mixed_registries() {
        let config = config_with(vec![
            RegistryConfig::new(RegistryKind::Consul, "http://consul:8500"),
            RegistryConfig::new(RegistryKind::Nacos, "nacos:18848"),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MixedRegistries(
                RegistryKind::Consul,
                RegistryKind::Nacos
            ))
        ));
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let config = config_with(vec![RegistryConfig::new(RegistryKind::Consul, "")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEndpoint { index: 0, .. })
        ));
    }

    #[test]
    fn test_registry_kind_homogeneous() {
        let config = config_with(vec![
            RegistryConfig::new(RegistryKind::Consul, "http://a:8500"),
            RegistryConfig::new(RegistryKind::Consul, "http://b:8500"),
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.registry_kind().unwrap(), Some(RegistryKind::Consul));
        assert_eq!(config_with(vec![]).registry_kind().unwrap(), None);
    }

    #[test]
    fn test_active_registries_single_nacos() {
        let config = config_with(vec![
            RegistryConfig::new(RegistryKind::Nacos, "nacos-1:18848"),
            RegistryConfig::new(RegistryKind::Nacos, "nacos-2:18848"),
        ]);
        let active = config.active_registries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].endpoint, "nacos-1:18848");
    }

    #[test]
    fn test_resolve_namespace() {
        let mut config = SyncerConfig::default();
        assert_eq!(config.resolve_namespace(None, None), "default");
        assert_eq!(
            config.resolve_namespace(Some(String::new()), Some(String::new())),
            "default"
        );
        assert_eq!(
            config.resolve_namespace(None, Some("istio-system".to_string())),
            "istio-system"
        );

        config.namespace = "mesh-external".to_string();
        assert_eq!(
            config.resolve_namespace(Some("published".to_string()), Some("istio-system".to_string())),
            "mesh-external"
        );
    }

    #[test]
    fn test_publish_namespace_wins_over_pod_namespace() {
        let config = SyncerConfig::default();
        assert_eq!(
            config.resolve_namespace(Some("published".to_string()), Some("istio-system".to_string())),
            "published"
        );
        assert_eq!(
            config.resolve_namespace(Some(String::new()), Some("istio-system".to_string())),
            "istio-system"
        );
    }

    #[test]
    fn test_target_namespace_fallback() {
        let registry = RegistryConfig::new(RegistryKind::Consul, "http://consul:8500");
        assert_eq!(registry.target_namespace_or("default"), "default");
        let registry = registry.with_target_namespace("external");
        assert_eq!(registry.target_namespace_or("default"), "external");
    }

    #[test]
    fn test_defaults() {
        let config: SyncerConfig = serde_json::from_str(r#"{"mesh_id": "m"}"#).unwrap();
        assert_eq!(config.sync_interval_secs, 5);
        assert_eq!(config.consul_poll_interval_secs, 10);
        assert_eq!(config.consul_wait_secs, 5);
        assert_eq!(config.ads.node_type, "sidecar");
        assert_eq!(config.ads.workload, "test-1");
        assert_eq!(config.ads.queue_capacity, 50);
        assert!(config.ads.reconnect);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_owner_defaults() {
        let owner: OwnerConfig = serde_json::from_str(r#"{"name": "registry-1"}"#).unwrap();
        assert_eq!(owner.api_version, DEFAULT_OWNER_API_VERSION);
        assert_eq!(owner.kind, DEFAULT_OWNER_KIND);
        assert_eq!(owner.uid, "");
    }
}
