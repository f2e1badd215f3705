//! Port resolution
//!
//! Maps a task group's declared ports onto the host address of the node the
//! allocation runs on.

use crate::client::{NetworkResource, Port};

use super::Endpoint;

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Host part of a node's agent address.
///
/// Nomad reports `HTTPAddr` as `host:agentPort`; the agent port is dropped
/// so workload ports can be appended. Handles bracketed IPv6 addresses and
/// an optional scheme. An address without a port is returned unchanged.
pub fn host_without_port(address: &str) -> &str {
    let address = address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address)
        .trim_end_matches('/');

    if let Some(rest) = address.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &address[..end + 2],
            None => address,
        };
    }

    match address.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':')
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => address,
    }
}

fn port_service(job_name: &str, label: &str) -> String {
    format!("{}-{}", job_name, label)
}

/// Endpoints for the group's mapped dynamic ports.
///
/// Only ports with a container target are considered. Each is matched by
/// label against the allocation's bindings; unmatched ports are skipped.
pub fn resolve_service_ports(
    network: &NetworkResource,
    bindings: &[Port],
    node_address: &str,
    job_name: &str,
) -> Vec<Endpoint> {
    let host = host_without_port(node_address);

    network
        .dynamic_ports
        .iter()
        .filter(|port| port.to != 0)
        .filter_map(|port| {
            bindings
                .iter()
                .find(|binding| binding.label == port.label)
                .map(|binding| {
                    Endpoint::fetched(
                        port_service(job_name, &port.label),
                        format!("{}:{}", host, binding.value),
                    )
                })
        })
        .collect()
}

/// Endpoints for the group's reserved host ports. Always emitted.
pub fn resolve_reserved_ports(
    network: &NetworkResource,
    node_address: &str,
    job_name: &str,
) -> Vec<Endpoint> {
    let host = host_without_port(node_address);

    network
        .reserved_ports
        .iter()
        .map(|port| {
            Endpoint::fetched(
                port_service(job_name, &port.label),
                format!("{}:{}", host, port.value),
            )
        })
        .collect()
}
