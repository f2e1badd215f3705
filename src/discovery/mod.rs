//! # Endpoint discovery
//!
//! Turns orchestrator state into a directory of "service → URL/port" entries.
//!
//! ## Pipeline
//!
//! ```text
//! DiscoveryService ──► AllocationWalker ──► ports::resolve_*      ──┐
//!   (per call)          (per allocation)    tags::extract_*       │
//!                                                                  ▼
//!                        ExtractionContext (locked snapshot) ──► directory::deduplicate
//! ```
//!
//! Every call lists allocations and walks them from scratch. Nothing is
//! cached between calls; the only long-lived pieces are the orchestrator
//! client and the immutable list of configured endpoints.

pub mod directory;
pub mod ports;
pub mod service;
pub mod tags;
pub mod walker;

pub use directory::deduplicate;
pub use ports::{host_without_port, resolve_reserved_ports, resolve_service_ports};
pub use service::{DiscoveryService, ServiceStatus, DEFAULT_CONCURRENCY};
pub use tags::{extract_icon, extract_routing_url};
pub use walker::{AllocationEndpoints, AllocationSnapshot, AllocationWalker, ExtractionContext};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;

/// A discovered or configured service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Directory key: job name, `job-owner`, or `job-portLabel`
    pub service: String,

    /// Routed `https://` URL, `host:port`, or a configured URL
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// True when read from the cluster during this call
    #[serde(default)]
    pub fetched: bool,
}

impl Endpoint {
    /// An endpoint read from live cluster state
    pub fn fetched(service: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            icon: None,
            fetched: true,
        }
    }

    /// An operator-configured endpoint
    pub fn configured(
        service: impl Into<String>,
        url: impl Into<String>,
        icon: Option<String>,
    ) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            icon,
            fetched: false,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Directory key for a service owned by `owner` inside `job_name`.
///
/// A service named after its job is keyed by the job name alone.
pub fn service_key(job_name: &str, owner: &str) -> String {
    if job_name == owner {
        job_name.to_string()
    } else {
        format!("{}-{}", job_name, owner)
    }
}

/// Errors surfaced by discovery operations
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to list allocations: {0}")]
    ListAllocations(#[source] ClientError),

    #[error("Failed to get job {job_id} for allocation {allocation_id}: {source}")]
    JobLookup {
        allocation_id: String,
        job_id: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to restart allocation {allocation_id}: {source}")]
    Restart {
        allocation_id: String,
        #[source]
        source: ClientError,
    },

    #[error("Extraction cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_key() {
        assert_eq!(service_key("web", "web"), "web");
        assert_eq!(service_key("web", "api"), "web-api");
    }

    #[test]
    fn test_endpoint_serialization() {
        let endpoint = Endpoint::fetched("web", "https://app.example.com");
        let json = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(json["service"], "web");
        assert_eq!(json["fetched"], true);
        assert!(json.get("icon").is_none());

        let configured = Endpoint::configured("nas", "http://nas.lan", Some("mdi:nas".into()));
        let json = serde_json::to_value(&configured).unwrap();
        assert_eq!(json["icon"], "mdi:nas");
        assert_eq!(json["fetched"], false);
    }

    #[test]
    fn test_error_context() {
        let err = DiscoveryError::Restart {
            allocation_id: "a1".to_string(),
            source: ClientError::Http("timeout".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to restart allocation a1: HTTP error: timeout"
        );
    }
}
