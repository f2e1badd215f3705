use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// Nomad encodes empty collections as `null`; treat that as the default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Entry of `GET /v1/allocations`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(default)]
    pub task_group: String,
    #[serde(default)]
    pub client_status: String,
}

/// A labelled port, used both for declarations and concrete bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Port {
    #[serde(default)]
    pub label: String,
    /// Host port value (bound port for dynamic ports, fixed port for reserved ones)
    #[serde(default)]
    pub value: u16,
    /// Port inside the task the host port maps to (0 when unmapped)
    #[serde(default)]
    pub to: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkResource {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dynamic_ports: Vec<Port>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reserved_ports: Vec<Port>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationResources {
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: Vec<NetworkResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedResources {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocatedResources {
    #[serde(default, deserialize_with = "null_as_default")]
    pub shared: SharedResources,
}

/// Response of `GET /v1/allocation/:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(default)]
    pub task_group: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: AllocationResources,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allocated_resources: AllocatedResources,
}

impl Allocation {
    /// Concrete port bindings of this allocation.
    ///
    /// Legacy `Resources.Networks` bindings come first, followed by the
    /// group-level `AllocatedResources.Shared.Ports` of newer Nomad versions.
    pub fn port_bindings(&self) -> Vec<Port> {
        self.resources
            .networks
            .iter()
            .flat_map(|n| n.dynamic_ports.iter())
            .chain(self.allocated_resources.shared.ports.iter())
            .cloned()
            .collect()
    }

    /// Summary view, as it appears in the allocation list
    pub fn stub(&self) -> AllocationStub {
        AllocationStub {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            node_id: self.node_id.clone(),
            task_group: self.task_group.clone(),
            client_status: "running".to_string(),
        }
    }
}

/// Response of `GET /v1/node/:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Address of the node's Nomad agent, e.g. "10.0.0.5:4646"
    #[serde(rename = "HTTPAddr", default)]
    pub http_addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: Vec<NetworkResource>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<Service>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    /// The group's network block. Nomad allows only one per group.
    pub fn network(&self) -> Option<&NetworkResource> {
        self.networks.first()
    }
}

/// Response of `GET /v1/job/:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_groups: Vec<TaskGroup>,
}

#[derive(Debug, Serialize)]
struct RestartRequest<'a> {
    #[serde(rename = "TaskName")]
    task_name: &'a str,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("{0} not found")]
    NotFound(String),
}

// ============================================================================
// SBIO: Trait for abstraction (allows in-memory clients in tests)
// ============================================================================

/// Read and restart operations the discovery engine needs from the orchestrator.
///
/// Implementations are shared across concurrent requests.
#[async_trait]
pub trait NomadClientTrait: Send + Sync {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, ClientError>;

    async fn get_allocation(&self, id: &str) -> Result<Allocation, ClientError>;

    async fn get_node(&self, id: &str) -> Result<Node, ClientError>;

    async fn get_job(&self, id: &str) -> Result<Job, ClientError>;

    /// Restart an allocation. An empty task name restarts every task.
    async fn restart_allocation(&self, id: &str, task_name: &str) -> Result<(), ClientError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct NomadClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    namespace: Option<String>,
}

impl NomadClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
            namespace,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.url(path));

        if let Some(ref token) = self.token {
            req = req.header("X-Nomad-Token", token);
        }
        if let Some(ref namespace) = self.namespace {
            req = req.query(&[("namespace", namespace)]);
        }

        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = req.send().await.map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!("GET {}", path);
        let response = self.send(self.request(reqwest::Method::GET, path)).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

#[async_trait]
impl NomadClientTrait for NomadClient {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, ClientError> {
        self.get_json("/v1/allocations").await
    }

    async fn get_allocation(&self, id: &str) -> Result<Allocation, ClientError> {
        self.get_json(&format!("/v1/allocation/{}", id)).await
    }

    async fn get_node(&self, id: &str) -> Result<Node, ClientError> {
        self.get_json(&format!("/v1/node/{}", id)).await
    }

    async fn get_job(&self, id: &str) -> Result<Job, ClientError> {
        self.get_json(&format!("/v1/job/{}", id)).await
    }

    async fn restart_allocation(&self, id: &str, task_name: &str) -> Result<(), ClientError> {
        let path = format!("/v1/client/allocation/{}/restart", id);
        debug!("PUT {}", path);
        let req = self
            .request(reqwest::Method::PUT, &path)
            .json(&RestartRequest { task_name });
        self.send(req).await?;
        Ok(())
    }
}
