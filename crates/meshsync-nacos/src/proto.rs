//! Protocol buffer messages for the discovery stream
//!
//! Only the envoy discovery envelope, the MCP resource wrapper and the istio
//! payloads this client decodes are defined here. Field tags match the
//! upstream `.proto` files so the messages interoperate on the wire.

use std::collections::HashMap;

use prost::Message;
use prost_types::Any;
use serde::{Deserialize, Serialize};

/// Full gRPC path of the aggregated discovery stream
pub const ADS_STREAM_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";

/// Type URLs understood by the client
pub mod type_urls {
    /// MCP ServiceEntry collection
    pub const SERVICE_ENTRY: &str = "networking.istio.io/v1alpha3/ServiceEntry";
    /// Mesh-wide configuration, handled inline
    pub const MESH_CONFIG: &str = "mesh.istio.io/v1alpha1/MeshConfig";
    pub const ENDPOINT: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
    pub const ROUTE: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
    /// Body of an MCP ServiceEntry resource
    pub const ISTIO_SERVICE_ENTRY: &str =
        "type.googleapis.com/istio.networking.v1alpha3.ServiceEntry";
    pub const MCP_RESOURCE: &str = "type.googleapis.com/istio.mcp.v1alpha1.Resource";
}

/// Wrap `message` into an `Any` with the given type URL.
pub fn to_any<M: Message>(type_url: &str, message: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

// ============================================================================
// envoy.service.discovery.v3
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryRequest {
    #[prost(string, tag = "1")]
    pub version_info: String,
    #[prost(message, optional, tag = "2")]
    pub node: Option<Node>,
    #[prost(string, repeated, tag = "3")]
    pub resource_names: Vec<String>,
    #[prost(string, tag = "4")]
    pub type_url: String,
    #[prost(string, tag = "5")]
    pub response_nonce: String,
    #[prost(message, optional, tag = "6")]
    pub error_detail: Option<Status>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryResponse {
    #[prost(string, tag = "1")]
    pub version_info: String,
    #[prost(message, repeated, tag = "2")]
    pub resources: Vec<Any>,
    #[prost(bool, tag = "3")]
    pub canary: bool,
    #[prost(string, tag = "4")]
    pub type_url: String,
    #[prost(string, tag = "5")]
    pub nonce: String,
    #[prost(message, optional, tag = "6")]
    pub control_plane: Option<ControlPlane>,
}

/// google.rpc.Status
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControlPlane {
    #[prost(string, tag = "1")]
    pub identifier: String,
}

// ============================================================================
// envoy.config.core.v3
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub cluster: String,
    #[prost(message, optional, tag = "3")]
    pub metadata: Option<prost_types::Struct>,
    #[prost(message, optional, tag = "4")]
    pub locality: Option<Locality>,
    #[prost(string, tag = "6")]
    pub user_agent_name: String,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Locality {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, tag = "2")]
    pub zone: String,
    #[prost(string, tag = "3")]
    pub sub_zone: String,
}

/// First field of `ClusterLoadAssignment` and `RouteConfiguration`, both
/// named resources keyed by tag 1.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedResource {
    #[prost(string, tag = "1")]
    pub name: String,
}

// ============================================================================
// istio.mcp.v1alpha1
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct McpResource {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<McpMetadata>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct McpMetadata {
    /// `namespace/name`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub create_time: Option<prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(map = "string, string", tag = "4")]
    pub labels: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub annotations: HashMap<String, String>,
}

// ============================================================================
// istio.networking.v1alpha3
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IstioServiceEntry {
    #[prost(string, repeated, tag = "1")]
    pub hosts: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub addresses: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub ports: Vec<IstioServicePort>,
    #[prost(enumeration = "IstioLocation", tag = "4")]
    pub location: i32,
    #[prost(enumeration = "IstioResolution", tag = "5")]
    pub resolution: i32,
    #[prost(message, repeated, tag = "6")]
    pub endpoints: Vec<IstioWorkloadEntry>,
    #[prost(string, repeated, tag = "7")]
    pub export_to: Vec<String>,
    #[prost(string, repeated, tag = "8")]
    pub subject_alt_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IstioServicePort {
    #[prost(uint32, tag = "1")]
    pub number: u32,
    #[prost(string, tag = "2")]
    pub protocol: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint32, tag = "4")]
    pub target_port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IstioWorkloadEntry {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(map = "string, uint32", tag = "2")]
    pub ports: HashMap<String, u32>,
    #[prost(map = "string, string", tag = "3")]
    pub labels: HashMap<String, String>,
    #[prost(string, tag = "4")]
    pub network: String,
    #[prost(string, tag = "5")]
    pub locality: String,
    #[prost(uint32, tag = "6")]
    pub weight: u32,
    #[prost(string, tag = "7")]
    pub service_account: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IstioLocation {
    MeshExternal = 0,
    MeshInternal = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IstioResolution {
    None = 0,
    Static = 1,
    Dns = 2,
    DnsRoundRobin = 3,
}

// ============================================================================
// istio.mesh.v1alpha1
// ============================================================================

/// Subset of the mesh-wide configuration this client keeps
///
/// Unknown fields are skipped on decode.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshConfig {
    #[prost(int32, tag = "4")]
    pub proxy_listen_port: i32,
    #[prost(int32, tag = "5")]
    pub proxy_http_port: i32,
    #[prost(string, tag = "7")]
    pub ingress_class: String,
    #[prost(string, tag = "8")]
    pub ingress_service: String,
    #[prost(bool, tag = "12")]
    pub enable_tracing: bool,
    #[prost(string, tag = "18")]
    pub access_log_file: String,
    #[prost(string, tag = "26")]
    pub trust_domain: String,
    #[prost(string, tag = "34")]
    pub root_namespace: String,
}
