//! Mesh API error types

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("conflict updating {namespace}/{name}: resource version {resource_version:?} is stale")]
    Conflict {
        namespace: String,
        name: String,
        resource_version: Option<String>,
    },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("mesh API unavailable: {0}")]
    Unavailable(String),
}

impl MeshError {
    /// Whether the error means the target object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            MeshError::NotFound { .. } => true,
            MeshError::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
