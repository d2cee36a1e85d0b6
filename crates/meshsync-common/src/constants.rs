//! Labels, annotations and defaults shared by the watchers and the synchronizer

/// Label marking a ServiceEntry as written by a registry synchronizer.
/// The value is the registry kind (`consul` or `nacos`).
pub const SYNCER_LABEL: &str = "ASM_Syncer";

/// Annotation requesting endpoint merging instead of a full overwrite.
pub const UPDATE_ANNOTATION: &str = "update";

/// Value written to [`UPDATE_ANNOTATION`] after a merge.
pub const UPDATE_ANNOTATION_VALUE: &str = "nacos-mesh";

/// Fallback namespace when neither configuration nor the environment name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Environment variable naming the namespace to publish into.
pub const PUBLISH_NAMESPACE_ENV: &str = "PUBLISH_NAMESPACE";

/// Environment variable carrying the pod's own namespace.
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// Default location of the legacy JSON registry list.
pub const DEFAULT_REGISTRY_CONFIG_PATH: &str = "/etc/istio/serviceregistry/RegistryConfig";

/// Default owner reference identity used when an owner is configured without one.
pub const DEFAULT_OWNER_API_VERSION: &str = "meshsync.io/v1beta1";
pub const DEFAULT_OWNER_KIND: &str = "ServiceRegistry";

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CONSUL_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_CONSUL_WAIT_SECS: u64 = 5;

/// Capacity of the bounded protocol-to-apply queue.
pub const DEFAULT_APPLY_QUEUE_CAPACITY: usize = 50;
