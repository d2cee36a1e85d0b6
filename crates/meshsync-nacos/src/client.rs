//! ADS/MCP discovery client
//!
//! Holds one bidirectional stream to the discovery server:
//!
//! ```text
//! connect -> open stream -> send ServiceEntry request -> receive loop
//!                 ^                                          |
//!                 +------------- backoff <---- stream error -+
//! ```
//!
//! Every response is acknowledged after processing. MCP ServiceEntry
//! resources are translated and handed to the apply loop through a bounded
//! queue; a full queue blocks the receive loop.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::uri::PathAndQuery;
use meshsync_common::{AdsSettings, ShutdownSignal};
use meshsync_mesh::ServiceEntry;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use prost_types::Any;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;
use tonic::transport::{Channel, Endpoint};
use tonic_prost::ProstCodec;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffConfig, ExponentialBackoff};
use crate::error::{AdsError, Result};
use crate::node::NodeIdentity;
use crate::proto::{
    ADS_STREAM_PATH, DiscoveryRequest, DiscoveryResponse, McpResource, MeshConfig, NamedResource,
    type_urls,
};
use crate::translate::translate;

/// Capacity of the type-update notification channel
pub const UPDATES_CAPACITY: usize = 100;

const REQUEST_BUFFER: usize = 16;
const GRPC_WINDOW_SIZE: u32 = 1 << 30;
const MAX_MESSAGE_SIZE: usize = 30 * 1024 * 1024;

/// Work item for the apply loop
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEntryOp {
    Upsert(ServiceEntry),
    Delete(ServiceEntry),
}

impl ServiceEntryOp {
    pub fn entry(&self) -> &ServiceEntry {
        match self {
            ServiceEntryOp::Upsert(entry) | ServiceEntryOp::Delete(entry) => entry,
        }
    }
}

/// Observer invoked with every response before it is processed
pub trait ResponseHandler: Send + Sync {
    fn handle_response(&self, response: &DiscoveryResponse);
}

/// `group/version/kind` decoded from a type URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// `None` unless the URL has exactly three `/`-separated parts.
    pub fn parse(type_url: &str) -> Option<Self> {
        let mut parts = type_url.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(version), Some(kind)) if !kind.contains('/') => Some(Self {
                group: group.to_string(),
                version: version.to_string(),
                kind: kind.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

#[derive(Clone)]
pub struct AdsClientConfig {
    pub address: String,
    pub node: NodeIdentity,
    /// Mesh config is written to `<local_cache_dir>_mesh.json` when set
    pub local_cache_dir: Option<String>,
    /// Reconnect policy; without one a stream failure closes the client
    pub backoff: Option<BackoffConfig>,
    pub queue_capacity: usize,
    pub response_handler: Option<Arc<dyn ResponseHandler>>,
}

impl AdsClientConfig {
    pub fn new(address: impl Into<String>, node: NodeIdentity) -> Self {
        Self {
            address: address.into(),
            node,
            local_cache_dir: None,
            backoff: Some(BackoffConfig::default()),
            queue_capacity: meshsync_common::constants::DEFAULT_APPLY_QUEUE_CAPACITY,
            response_handler: None,
        }
    }

    pub fn from_settings(address: impl Into<String>, settings: &AdsSettings) -> Self {
        let mut config = Self::new(address, NodeIdentity::from_settings(settings));
        config.local_cache_dir = settings.local_cache_dir.clone().filter(|d| !d.is_empty());
        config.backoff = settings.reconnect.then(BackoffConfig::default);
        config.queue_capacity = settings.queue_capacity.max(1);
        config
    }

    pub fn with_backoff(mut self, backoff: Option<BackoffConfig>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_local_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.local_cache_dir = Some(dir.into());
        self
    }

    pub fn with_response_handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.response_handler = Some(handler);
        self
    }
}

/// Receiving ends handed to the consumers of an [`AdsClient`]
pub struct AdsChannels {
    /// ServiceEntry operations in submission order
    pub ops: mpsc::Receiver<ServiceEntryOp>,
    /// Each newly seen resource type once; an empty string once closed
    pub updates: mpsc::Receiver<String>,
}

#[derive(Default)]
struct AdsState {
    /// Last `version_info` per type URL
    version_info: HashMap<String, String>,
    /// Last response time per type URL
    received: HashMap<String, DateTime<Utc>>,
    /// First response time per group/version/kind
    synced: HashMap<String, DateTime<Utc>>,
    /// Last applied MCP version per `namespace/name`
    resource_versions: HashMap<String, String>,
    /// Names held for endpoint and route types
    held: HashMap<String, BTreeSet<String>>,
}

/// Path the mesh config is persisted to for a cache dir prefix.
pub fn mesh_cache_path(local_cache_dir: &str) -> PathBuf {
    PathBuf::from(format!("{}_mesh.json", local_cache_dir))
}

fn parse_address(address: &str) -> Result<Endpoint> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AdsError::InvalidAddress(address.to_string()));
    }
    let uri = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let endpoint = Endpoint::from_shared(uri)
        .map_err(|e| AdsError::InvalidAddress(format!("{}: {}", address, e)))?
        .connect_timeout(Duration::from_secs(5))
        .http2_keep_alive_interval(Duration::from_secs(30))
        .keep_alive_timeout(Duration::from_secs(10))
        .keep_alive_while_idle(true)
        .initial_stream_window_size(GRPC_WINDOW_SIZE)
        .initial_connection_window_size(GRPC_WINDOW_SIZE);
    Ok(endpoint)
}

pub struct AdsClient {
    config: AdsClientConfig,
    endpoint: Endpoint,
    backoff: Option<Mutex<ExponentialBackoff>>,
    state: Mutex<AdsState>,
    mesh: RwLock<Option<MeshConfig>>,
    ops: Mutex<Option<mpsc::Sender<ServiceEntryOp>>>,
    updates: mpsc::Sender<String>,
    closed: AtomicBool,
}

impl AdsClient {
    pub fn new(config: AdsClientConfig) -> Result<(Self, AdsChannels)> {
        let endpoint = parse_address(&config.address)?;
        let (ops_tx, ops_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (updates_tx, updates_rx) = mpsc::channel(UPDATES_CAPACITY);
        let backoff = config
            .backoff
            .clone()
            .map(|b| Mutex::new(ExponentialBackoff::new(b)));

        let client = Self {
            config,
            endpoint,
            backoff,
            state: Mutex::new(AdsState::default()),
            mesh: RwLock::new(None),
            ops: Mutex::new(Some(ops_tx)),
            updates: updates_tx,
            closed: AtomicBool::new(false),
        };
        Ok((
            client,
            AdsChannels {
                ops: ops_rx,
                updates: updates_rx,
            },
        ))
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn node_id(&self) -> &str {
        self.config.node.id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Last mesh-wide configuration received.
    pub fn mesh_config(&self) -> Option<MeshConfig> {
        self.mesh.read().clone()
    }

    pub fn version_info(&self, type_url: &str) -> Option<String> {
        self.state.lock().version_info.get(type_url).cloned()
    }

    pub fn last_received(&self, type_url: &str) -> Option<DateTime<Utc>> {
        self.state.lock().received.get(type_url).copied()
    }

    /// Request opening every stream: ServiceEntries, with the node identity.
    pub fn initial_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(self.config.node.to_node()),
            type_url: type_urls::SERVICE_ENTRY.to_string(),
            response_nonce: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    /// Acknowledgment for `response`.
    pub fn ack(&self, response: &DiscoveryResponse) -> DiscoveryRequest {
        let resource_names = match response.type_url.as_str() {
            type_urls::ENDPOINT | type_urls::ROUTE => self
                .state
                .lock()
                .held
                .get(&response.type_url)
                .map(|names| names.iter().cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        DiscoveryRequest {
            version_info: response.version_info.clone(),
            node: Some(self.config.node.to_node()),
            resource_names,
            type_url: response.type_url.clone(),
            response_nonce: response.nonce.clone(),
            error_detail: None,
        }
    }

    /// Process one response and return its acknowledgment.
    ///
    /// Fails only once the client is closed; per-resource problems are
    /// logged and skipped.
    pub async fn handle_response(&self, response: &DiscoveryResponse) -> Result<DiscoveryRequest> {
        info!(
            address = %self.config.address,
            type_url = %response.type_url,
            count = response.resources.len(),
            nonce = %response.nonce,
            "Received discovery response"
        );
        if let Some(handler) = &self.config.response_handler {
            handler.handle_response(response);
        }

        self.state
            .lock()
            .received
            .insert(response.type_url.clone(), Utc::now());
        let gvk = GroupVersionKind::parse(&response.type_url);

        if response.type_url == type_urls::MESH_CONFIG {
            if let Some(resource) = response.resources.first() {
                self.handle_mesh_config(resource).await;
            }
        } else {
            self.state
                .lock()
                .version_info
                .insert(response.type_url.clone(), response.version_info.clone());

            match response.type_url.as_str() {
                type_urls::ENDPOINT | type_urls::ROUTE => {
                    self.record_held_names(&response.type_url, &response.resources)
                }
                _ if gvk.is_some() => self.handle_mcp(&response.resources).await?,
                _ => debug!(type_url = %response.type_url, "Ignoring resources of unknown type"),
            }
        }

        if let Some(gvk) = gvk {
            self.mark_synced(&gvk);
        }
        Ok(self.ack(response))
    }

    async fn handle_mesh_config(&self, resource: &Any) {
        let mesh = match MeshConfig::decode(resource.value.as_slice()) {
            Ok(mesh) => mesh,
            Err(e) => {
                warn!(error = %e, "Failed to decode mesh config");
                MeshConfig::default()
            }
        };

        if let Some(dir) = &self.config.local_cache_dir {
            let path = mesh_cache_path(dir);
            let written = match serde_json::to_vec_pretty(&mesh) {
                Ok(json) => tokio::fs::write(&path, json).await.map_err(AdsError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = written {
                warn!(path = %path.display(), error = %e, "Failed to persist mesh config");
            }
        }
        *self.mesh.write() = Some(mesh);
    }

    fn record_held_names(&self, type_url: &str, resources: &[Any]) {
        let names: BTreeSet<String> = resources
            .iter()
            .filter_map(|r| NamedResource::decode(r.value.as_slice()).ok())
            .map(|r| r.name)
            .filter(|name| !name.is_empty())
            .collect();
        debug!(type_url, count = names.len(), "Holding resource names");
        self.state.lock().held.insert(type_url.to_string(), names);
    }

    async fn handle_mcp(&self, resources: &[Any]) -> Result<()> {
        for any in resources {
            let resource = match McpResource::decode(any.value.as_slice()) {
                Ok(resource) => resource,
                Err(e) => {
                    error!(error = %e, "Failed to decode MCP resource");
                    continue;
                }
            };
            let Some(metadata) = resource.metadata.as_ref() else {
                warn!("Skipping MCP resource without metadata");
                continue;
            };
            let (name, version) = (metadata.name.clone(), metadata.version.clone());

            if self.state.lock().resource_versions.get(&name) == Some(&version) {
                debug!(resource = %name, version = %version, "ServiceEntry version unchanged");
                continue;
            }

            let entry = match translate(&resource) {
                Ok(entry) => entry,
                Err(e) => {
                    error!(resource = %name, error = %e, "Invalid MCP resource");
                    continue;
                }
            };

            let op = {
                let mut state = self.state.lock();
                if entry.spec.endpoints.is_empty() {
                    state.resource_versions.remove(&name);
                    ServiceEntryOp::Delete(entry)
                } else {
                    state.resource_versions.insert(name, version);
                    ServiceEntryOp::Upsert(entry)
                }
            };
            self.enqueue(op).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, op: ServiceEntryOp) -> Result<()> {
        let sender = self.ops.lock().as_ref().cloned().ok_or(AdsError::Closed)?;
        sender.send(op).await.map_err(|_| AdsError::Closed)
    }

    fn mark_synced(&self, gvk: &GroupVersionKind) {
        let key = gvk.to_string();
        let first = match self.state.lock().synced.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                true
            }
        };
        if !first {
            return;
        }
        if let Err(e) = self.updates.try_send(key) {
            debug!(error = %e, "Dropped type update notification");
        }
    }

    /// Close the client: the op queue is closed and an empty type update
    /// is published. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ops.lock().take();
        if let Err(e) = self.updates.try_send(String::new()) {
            debug!(error = %e, "Dropped close notification");
        }
        info!(node = %self.node_id(), "Discovery client closed");
    }

    async fn open_stream(
        &self,
        channel: Channel,
    ) -> Result<(mpsc::Sender<DiscoveryRequest>, Streaming<DiscoveryResponse>)> {
        let (requests, outbound) = mpsc::channel(REQUEST_BUFFER);
        requests
            .send(self.initial_request())
            .await
            .map_err(|_| AdsError::Closed)?;

        let mut grpc = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))?;

        let codec: ProstCodec<DiscoveryRequest, DiscoveryResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static(ADS_STREAM_PATH);
        let response = grpc
            .streaming(
                tonic::Request::new(ReceiverStream::new(outbound)),
                path,
                codec,
            )
            .await?;
        Ok((requests, response.into_inner()))
    }

    async fn run_stream(&self) -> Result<()> {
        let channel = self.endpoint.connect().await?;
        let (requests, mut responses) = self.open_stream(channel).await?;
        info!(address = %self.config.address, node = %self.node_id(), "Discovery stream opened");

        while let Some(response) = responses.message().await? {
            if let Some(backoff) = &self.backoff {
                backoff.lock().reset();
            }
            let ack = self.handle_response(&response).await?;
            requests.send(ack).await.map_err(|_| AdsError::Closed)?;
        }
        Ok(())
    }

    /// Receive until shutdown, reconnecting with backoff when configured.
    ///
    /// The client is closed on return.
    pub async fn run(&self, shutdown: &ShutdownSignal) {
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_stream() => result,
            };
            match result {
                Ok(()) => info!(address = %self.config.address, "Discovery stream ended by server"),
                Err(AdsError::Closed) => break,
                Err(e) => warn!(
                    address = %self.config.address,
                    node = %self.node_id(),
                    error = %e,
                    "Discovery stream failed"
                ),
            }

            let Some(backoff) = &self.backoff else {
                break;
            };
            let delay = backoff.lock().next_backoff();
            info!(delay_ms = delay.as_millis(), "Reconnecting discovery stream");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::proto::{MeshConfig, to_any};
    use crate::translate::tests::{resource, workload};

    fn client(config: AdsClientConfig) -> (AdsClient, AdsChannels) {
        AdsClient::new(config).unwrap()
    }

    fn config() -> AdsClientConfig {
        AdsClientConfig::new("127.0.0.1:1", NodeIdentity::new("sidecar~10.0.0.9~test-1.default~default.svc.cluster.local"))
    }

    fn mcp_response(version: &str, nonce: &str, resources: Vec<McpResource>) -> DiscoveryResponse {
        DiscoveryResponse {
            version_info: version.to_string(),
            type_url: type_urls::SERVICE_ENTRY.to_string(),
            nonce: nonce.to_string(),
            resources: resources
                .iter()
                .map(|r| to_any(type_urls::MCP_RESOURCE, r))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_group_version_kind() {
        let gvk = GroupVersionKind::parse(type_urls::SERVICE_ENTRY).unwrap();
        assert_eq!(gvk.group, "networking.istio.io");
        assert_eq!(gvk.version, "v1alpha3");
        assert_eq!(gvk.kind, "ServiceEntry");
        assert_eq!(gvk.to_string(), type_urls::SERVICE_ENTRY);

        assert!(GroupVersionKind::parse(type_urls::ENDPOINT).is_none());
        assert!(GroupVersionKind::parse("a/b/c/d").is_none());
    }

    #[test]
    fn test_invalid_address() {
        let config = AdsClientConfig::new("", NodeIdentity::new("n"));
        assert!(matches!(
            AdsClient::new(config),
            Err(AdsError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_initial_request() {
        let (client, _channels) = client(config());
        let request = client.initial_request();
        assert_eq!(request.type_url, type_urls::SERVICE_ENTRY);
        assert!(!request.response_nonce.is_empty());
        assert_eq!(request.node.unwrap().id, client.node_id());
    }

    #[tokio::test]
    async fn test_unchanged_version_enqueues_once() {
        let (client, mut channels) = client(config());
        let res = resource("default/foo", "1", vec![workload("10.0.0.1"), workload("10.0.0.2")]);

        client
            .handle_response(&mcp_response("v1", "n1", vec![res.clone()]))
            .await
            .unwrap();
        client
            .handle_response(&mcp_response("v2", "n2", vec![res]))
            .await
            .unwrap();

        match channels.ops.try_recv().unwrap() {
            ServiceEntryOp::Upsert(entry) => {
                assert_eq!(entry.name(), "foo");
                assert_eq!(entry.namespace(), "default");
                assert_eq!(entry.spec.endpoints.len(), 2);
            }
            other => panic!("unexpected op: {:?}", other),
        }
        assert!(channels.ops.try_recv().is_err());
        assert_eq!(client.version_info(type_urls::SERVICE_ENTRY).as_deref(), Some("v2"));
        assert!(client.last_received(type_urls::SERVICE_ENTRY).is_some());
    }

    #[tokio::test]
    async fn test_dedup_is_per_namespace() {
        let (client, mut channels) = client(config());
        let response = mcp_response(
            "v1",
            "n1",
            vec![
                resource("team-a/foo", "1", vec![workload("10.0.0.1")]),
                resource("team-b/foo", "1", vec![workload("10.0.0.2")]),
            ],
        );
        client.handle_response(&response).await.unwrap();

        assert_eq!(channels.ops.try_recv().unwrap().entry().namespace(), "team-a");
        assert_eq!(channels.ops.try_recv().unwrap().entry().namespace(), "team-b");
    }

    #[tokio::test]
    async fn test_new_version_and_delete() {
        let (client, mut channels) = client(config());
        client
            .handle_response(&mcp_response("v1", "n1", vec![resource("default/foo", "1", vec![workload("10.0.0.1")])]))
            .await
            .unwrap();
        client
            .handle_response(&mcp_response("v2", "n2", vec![resource("default/foo", "2", vec![])]))
            .await
            .unwrap();
        // Deleted resources are forgotten, so a re-add with an old version applies
        client
            .handle_response(&mcp_response("v3", "n3", vec![resource("default/foo", "1", vec![workload("10.0.0.1")])]))
            .await
            .unwrap();

        assert!(matches!(channels.ops.try_recv(), Ok(ServiceEntryOp::Upsert(_))));
        assert!(matches!(channels.ops.try_recv(), Ok(ServiceEntryOp::Delete(_))));
        assert!(matches!(channels.ops.try_recv(), Ok(ServiceEntryOp::Upsert(_))));
    }

    #[tokio::test]
    async fn test_invalid_resource_does_not_stop_batch() {
        let (client, mut channels) = client(config());
        let mut response = mcp_response(
            "v1",
            "n1",
            vec![
                resource("foo", "1", vec![workload("10.0.0.1")]),
                resource("default/bar", "1", vec![workload("10.0.0.2")]),
            ],
        );
        response.resources.insert(
            0,
            Any {
                type_url: type_urls::MCP_RESOURCE.to_string(),
                value: vec![0xff, 0xff, 0xff],
            },
        );

        let ack = client.handle_response(&response).await.unwrap();
        assert_eq!(ack.response_nonce, "n1");
        assert_eq!(channels.ops.try_recv().unwrap().entry().name(), "bar");
        assert!(channels.ops.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ack_echoes_response() {
        let (client, _channels) = client(config());
        let ack = client
            .handle_response(&mcp_response("v9", "nonce-9", vec![]))
            .await
            .unwrap();

        assert_eq!(ack.version_info, "v9");
        assert_eq!(ack.response_nonce, "nonce-9");
        assert_eq!(ack.type_url, type_urls::SERVICE_ENTRY);
        assert_eq!(ack.node.unwrap().id, client.node_id());
        assert!(ack.resource_names.is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_ack_readvertises_names() {
        let (client, _channels) = client(config());
        let response = DiscoveryResponse {
            type_url: type_urls::ENDPOINT.to_string(),
            nonce: "n1".to_string(),
            resources: ["outbound|80||b", "outbound|80||a"]
                .iter()
                .map(|name| {
                    to_any(
                        type_urls::ENDPOINT,
                        &NamedResource {
                            name: name.to_string(),
                        },
                    )
                })
                .collect(),
            ..Default::default()
        };

        let ack = client.handle_response(&response).await.unwrap();
        assert_eq!(ack.resource_names, vec!["outbound|80||a", "outbound|80||b"]);
    }

    #[tokio::test]
    async fn test_mesh_config_is_stored_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("cache").to_string_lossy().to_string();
        let (client, mut channels) = client(config().with_local_cache_dir(prefix.clone()));

        let mesh = MeshConfig {
            trust_domain: "cluster.local".to_string(),
            root_namespace: "istio-system".to_string(),
            ..Default::default()
        };
        let response = DiscoveryResponse {
            type_url: type_urls::MESH_CONFIG.to_string(),
            resources: vec![to_any(type_urls::MESH_CONFIG, &mesh)],
            ..Default::default()
        };
        client.handle_response(&response).await.unwrap();

        assert_eq!(client.mesh_config(), Some(mesh));
        let json = std::fs::read_to_string(mesh_cache_path(&prefix)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["trustDomain"], "cluster.local");
        assert!(channels.ops.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_type_updates_published_once() {
        let (client, mut channels) = client(config());
        client.handle_response(&mcp_response("v1", "n1", vec![])).await.unwrap();
        client.handle_response(&mcp_response("v2", "n2", vec![])).await.unwrap();

        assert_eq!(channels.updates.try_recv().unwrap(), type_urls::SERVICE_ENTRY);
        assert!(channels.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_handler_sees_every_response() {
        struct Counter(AtomicUsize);
        impl ResponseHandler for Counter {
            fn handle_response(&self, _response: &DiscoveryResponse) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let (client, _channels) = client(config().with_response_handler(counter.clone()));
        client.handle_response(&mcp_response("v1", "n1", vec![])).await.unwrap();
        client
            .handle_response(&DiscoveryResponse {
                type_url: type_urls::MESH_CONFIG.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_sends_sentinel_and_rejects_ops() {
        let (client, mut channels) = client(config());
        client.close();
        client.close();

        assert_eq!(channels.updates.try_recv().unwrap(), "");
        assert!(channels.updates.try_recv().is_err());
        assert!(channels.ops.recv().await.is_none());

        let result = client
            .handle_response(&mcp_response("v1", "n1", vec![resource("default/foo", "1", vec![workload("10.0.0.1")])]))
            .await;
        assert!(matches!(result, Err(AdsError::Closed)));
    }

    #[tokio::test]
    async fn test_run_without_backoff_closes_on_failure() {
        let (client, mut channels) = client(config().with_backoff(None));
        let shutdown = ShutdownSignal::new();

        tokio::time::timeout(Duration::from_secs(10), client.run(&shutdown))
            .await
            .unwrap();
        assert!(client.is_closed());
        assert_eq!(channels.updates.recv().await.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_run_with_backoff_stops_on_shutdown() {
        let (client, _channels) = client(config());
        let shutdown = ShutdownSignal::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            signal.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(10), client.run(&shutdown))
            .await
            .unwrap();
        assert!(client.is_closed());
    }
}
