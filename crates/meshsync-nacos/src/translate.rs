//! MCP resource to ServiceEntry translation

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meshsync_mesh::{Location, Port, Resolution, ServiceEntry, ServiceEntrySpec, WorkloadEntry};
use prost::Message;
use tracing::debug;

use crate::error::{AdsError, Result};
use crate::proto::{
    IstioLocation, IstioResolution, IstioServiceEntry, IstioWorkloadEntry, McpResource, type_urls,
};

/// Endpoint labels that survive translation
const KEPT_ENDPOINT_LABELS: [&str; 2] = ["app", "version"];

/// One decoded MCP resource
#[derive(Debug, Clone, PartialEq)]
pub struct McpConfig {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub create_time: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: IstioServiceEntry,
}

/// Split `namespace/name`.
pub fn split_resource_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((namespace, local))
            if !namespace.is_empty() && !local.is_empty() && !local.contains('/') =>
        {
            Ok((namespace, local))
        }
        _ => Err(AdsError::InvalidResourceName(name.to_string())),
    }
}

fn is_service_entry_body(type_url: &str) -> bool {
    type_url.is_empty()
        || type_url == type_urls::ISTIO_SERVICE_ENTRY
        || type_url.rsplit('/').next() == Some("istio.networking.v1alpha3.ServiceEntry")
}

pub fn decode_resource(resource: &McpResource) -> Result<McpConfig> {
    let metadata = resource.metadata.as_ref().ok_or(AdsError::MissingMetadata)?;
    let (namespace, name) = split_resource_name(&metadata.name)?;

    let spec = match &resource.body {
        Some(body) if is_service_entry_body(&body.type_url) => {
            IstioServiceEntry::decode(body.value.as_slice())?
        }
        Some(body) => return Err(AdsError::UnsupportedType(body.type_url.clone())),
        None => IstioServiceEntry::default(),
    };

    let create_time = metadata
        .create_time
        .as_ref()
        .and_then(|ts| DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).unwrap_or(0)));

    Ok(McpConfig {
        namespace: namespace.to_string(),
        name: name.to_string(),
        version: metadata.version.clone(),
        create_time,
        labels: metadata.labels.clone().into_iter().collect(),
        annotations: metadata.annotations.clone().into_iter().collect(),
        spec,
    })
}

fn location(value: IstioLocation) -> Location {
    match value {
        IstioLocation::MeshExternal => Location::MeshExternal,
        IstioLocation::MeshInternal => Location::MeshInternal,
    }
}

fn resolution(value: IstioResolution) -> Resolution {
    match value {
        IstioResolution::None => Resolution::None,
        IstioResolution::Static => Resolution::Static,
        IstioResolution::Dns => Resolution::Dns,
        IstioResolution::DnsRoundRobin => Resolution::DnsRoundRobin,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn endpoint(entry: &IstioWorkloadEntry) -> WorkloadEntry {
    WorkloadEntry {
        address: entry.address.clone(),
        ports: entry.ports.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        labels: entry
            .labels
            .iter()
            .filter(|(k, _)| KEPT_ENDPOINT_LABELS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        network: non_empty(&entry.network),
        locality: non_empty(&entry.locality),
        weight: (entry.weight > 0).then_some(entry.weight),
        service_account: non_empty(&entry.service_account),
    }
}

/// Build the ServiceEntry object for a decoded resource.
///
/// Names and hosts are lower-cased; endpoints keep only `app` and `version`
/// labels.
pub fn to_service_entry(config: McpConfig) -> ServiceEntry {
    let source = &config.spec;
    let spec = ServiceEntrySpec {
        hosts: source.hosts.iter().map(|h| h.to_lowercase()).collect(),
        addresses: source.addresses.clone(),
        ports: source
            .ports
            .iter()
            .map(|p| Port {
                number: p.number,
                protocol: p.protocol.clone(),
                name: p.name.clone(),
                target_port: (p.target_port > 0).then_some(p.target_port),
            })
            .collect(),
        location: location(source.location()),
        resolution: resolution(source.resolution()),
        endpoints: source.endpoints.iter().map(endpoint).collect(),
        export_to: source.export_to.clone(),
        subject_alt_names: source.subject_alt_names.clone(),
    };

    let mut entry = ServiceEntry::new(&config.name.to_lowercase(), spec);
    entry.metadata.namespace = Some(config.namespace);
    if !config.labels.is_empty() {
        entry.metadata.labels = Some(config.labels);
    }
    if !config.annotations.is_empty() {
        entry.metadata.annotations = Some(config.annotations);
    }
    entry
}

/// Decode and translate one MCP resource.
pub fn translate(resource: &McpResource) -> Result<ServiceEntry> {
    let config = decode_resource(resource)?;
    debug!(
        namespace = %config.namespace,
        name = %config.name,
        version = %config.version,
        created = ?config.create_time,
        "Translating MCP resource"
    );
    Ok(to_service_entry(config))
}
