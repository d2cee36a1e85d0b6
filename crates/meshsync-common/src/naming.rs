//! Host name canonicalization

use std::net::IpAddr;

/// Replace characters that are not allowed in resource names.
///
/// Registry service names commonly use underscores, which Kubernetes object
/// names reject.
pub fn formatted_name(host: &str) -> String {
    host.replace('_', "-")
}

/// Cache key for a registry service: the watcher's prefix followed by the
/// formatted service name.
pub fn host_key(prefix: &str, service: &str) -> String {
    format!("{}{}", prefix, formatted_name(service))
}

/// Whether `address` is an IPv4 or IPv6 literal.
pub fn is_ip_address(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok()
}
