//! Configuration error types

use crate::config::RegistryKind;

/// Errors detected while loading or validating configuration.
///
/// These are fatal to the affected watcher's setup and are reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mesh id is required")]
    MissingMeshId,

    #[error("unsupported registry type: {0}")]
    UnsupportedRegistry(String),

    #[error("registry types must not be mixed: found {0} and {1}")]
    MixedRegistries(RegistryKind, RegistryKind),

    #[error("registry #{index} ({kind}) has no endpoint")]
    MissingEndpoint { index: usize, kind: RegistryKind },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ConfigError::MissingMeshId.to_string(), "mesh id is required");

        let err = ConfigError::UnsupportedRegistry("eureka".to_string());
        assert_eq!(err.to_string(), "unsupported registry type: eureka");

        let err = ConfigError::MixedRegistries(RegistryKind::Consul, RegistryKind::Nacos);
        assert_eq!(
            err.to_string(),
            "registry types must not be mixed: found consul and nacos"
        );

        let err = ConfigError::MissingEndpoint {
            index: 2,
            kind: RegistryKind::Consul,
        };
        assert_eq!(err.to_string(), "registry #2 (consul) has no endpoint");
    }
}
