//! Mesh API abstraction
//!
//! The synchronizer and the streaming apply loop only need CRUD on
//! ServiceEntries plus namespace provisioning. Implementations must be safe
//! for concurrent callers; no cross-object transaction is offered.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tracing::{debug, info};

use crate::error::{MeshError, Result};
use crate::model::ServiceEntry;

#[async_trait]
pub trait MeshApi: Send + Sync {
    /// Fetch an entry; `None` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceEntry>>;

    async fn create(&self, entry: &ServiceEntry) -> Result<ServiceEntry>;

    /// Replace an entry. `entry.metadata.resource_version` must carry the
    /// version last read.
    async fn update(&self, entry: &ServiceEntry) -> Result<ServiceEntry>;

    /// Delete an entry; fails with a not-found error when absent.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create `namespace` if it does not exist yet.
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;
}

fn target(entry: &ServiceEntry) -> Result<(&str, &str)> {
    match (
        entry.metadata.namespace.as_deref(),
        entry.metadata.name.as_deref(),
    ) {
        (Some(namespace), Some(name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        _ => Err(MeshError::InvalidObject(
            "ServiceEntry requires a name and a namespace".to_string(),
        )),
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

/// Read the current context of the kubeconfig file at `path`.
pub async fn load_kubeconfig(path: &Path) -> Result<Config> {
    let kubeconfig = Kubeconfig::read_from(path)?;
    Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
}

/// Mesh API backed by a Kubernetes cluster running Istio.
#[derive(Clone)]
pub struct KubeMeshClient {
    client: Client,
}

impl KubeMeshClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client built from the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Client for the current context of the kubeconfig at `path`, or the
    /// ambient configuration when no path is given.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        match kubeconfig {
            Some(path) => {
                let config = load_kubeconfig(path).await?;
                info!(path = %path.display(), cluster = %config.cluster_url, "Using kubeconfig");
                Ok(Self::new(Client::try_from(config)?))
            }
            None => Self::try_default().await,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// ServiceEntries across all namespaces, for the change feed.
    pub fn all_service_entries(&self) -> Api<ServiceEntry> {
        Api::all(self.client.clone())
    }

    fn service_entries(&self, namespace: &str) -> Api<ServiceEntry> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl MeshApi for KubeMeshClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceEntry>> {
        Ok(self.service_entries(namespace).get_opt(name).await?)
    }

    async fn create(&self, entry: &ServiceEntry) -> Result<ServiceEntry> {
        let (namespace, _) = target(entry)?;
        let created = self
            .service_entries(namespace)
            .create(&PostParams::default(), entry)
            .await?;
        Ok(created)
    }

    async fn update(&self, entry: &ServiceEntry) -> Result<ServiceEntry> {
        let (namespace, name) = target(entry)?;
        let updated = self
            .service_entries(namespace)
            .replace(name, &PostParams::default(), entry)
            .await?;
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .service_entries(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(MeshError::NotFound {
                kind: "ServiceEntry",
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(namespace).await?.is_some() {
            debug!(namespace, "Namespace already exists");
            return Ok(());
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace, "Created namespace");
                Ok(())
            }
            // Lost a race with another writer.
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
