//! Desired-state construction for registry hosts
//!
//! A registry host and its endpoints map onto one `ServiceEntry` whose name
//! and single host are the formatted host name.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use meshsync_common::constants::SYNCER_LABEL;
use meshsync_common::{RegistryKind, formatted_name, is_ip_address};

use crate::model::{Location, Port, Resolution, ServiceEntry, ServiceEntrySpec, WorkloadEntry};

/// Protocol name conventionally served on `port`.
pub fn proto(port: u32) -> &'static str {
    match port {
        80 => "http",
        443 => "https",
        3306 => "mysql",
        6379 => "redis",
        27017 => "mongo",
        _ => "tcp",
    }
}

/// Endpoint with a single port named after its protocol.
pub fn endpoint(address: impl Into<String>, port: u32) -> WorkloadEntry {
    WorkloadEntry::new(address).with_port(proto(port), port)
}

/// Endpoint used when the registry reports no port: both 80 and 443.
pub fn dual_port_endpoint(address: impl Into<String>) -> WorkloadEntry {
    WorkloadEntry::new(address)
        .with_port("http", 80)
        .with_port("https", 443)
}

/// Service ports covering every endpoint port, one per number, ascending.
///
/// Names and protocols follow the port number, not the endpoint's port key.
pub fn ports(endpoints: &[WorkloadEntry]) -> Vec<Port> {
    let numbers: BTreeSet<u32> = endpoints
        .iter()
        .flat_map(|endpoint| endpoint.ports.values().copied())
        .collect();

    numbers
        .into_iter()
        .map(|number| {
            let name = proto(number);
            Port {
                number,
                protocol: name.to_uppercase(),
                name: name.to_string(),
                target_port: None,
            }
        })
        .collect()
}

/// `Static` iff there is at least one endpoint and every address is an IP
/// literal; `Dns` otherwise.
pub fn resolution(endpoints: &[WorkloadEntry]) -> Resolution {
    if !endpoints.is_empty() && endpoints.iter().all(|e| is_ip_address(&e.address)) {
        Resolution::Static
    } else {
        Resolution::Dns
    }
}

/// Builds ServiceEntries for one registry and target namespace.
#[derive(Debug, Clone)]
pub struct ServiceEntryBuilder {
    namespace: String,
    location: Location,
    registry: RegistryKind,
    owner: Option<OwnerReference>,
}

impl ServiceEntryBuilder {
    pub fn new(namespace: impl Into<String>, registry: RegistryKind) -> Self {
        Self {
            namespace: namespace.into(),
            location: Location::MeshExternal,
            registry,
            owner: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Stamp `owner` on every built entry.
    pub fn with_owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner = owner;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> RegistryKind {
        self.registry
    }

    /// Desired ServiceEntry for `host`.
    pub fn build(&self, host: &str, endpoints: &[WorkloadEntry]) -> ServiceEntry {
        let name = formatted_name(host);

        let addresses = endpoints
            .first()
            .filter(|e| is_ip_address(&e.address))
            .map(|e| vec![e.address.clone()])
            .unwrap_or_default();

        ServiceEntry {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    SYNCER_LABEL.to_string(),
                    self.registry.to_string(),
                )])),
                owner_references: self.owner.clone().map(|owner| vec![owner]),
                ..Default::default()
            },
            spec: ServiceEntrySpec {
                hosts: vec![name],
                addresses,
                ports: ports(endpoints),
                location: self.location,
                resolution: resolution(endpoints),
                endpoints: endpoints.to_vec(),
                ..Default::default()
            },
        }
    }
}
