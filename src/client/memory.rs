//! In-memory orchestrator client
//!
//! Serves a fixed cluster state from memory. Used by the tests and by the
//! server when it runs outside production, so the API can be exercised
//! without a Nomad agent.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::nomad::{
    Allocation, AllocationResources, AllocationStub, ClientError, Job, NetworkResource, Node,
    NomadClientTrait, Port, Service, Task, TaskGroup,
};

#[derive(Default)]
pub struct InMemoryNomadClient {
    allocations: Vec<Allocation>,
    nodes: HashMap<String, Node>,
    jobs: HashMap<String, Job>,
    fail_listing: bool,
    failing_allocations: HashSet<String>,
    failing_restarts: HashSet<String>,
    restarted: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryNomadClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.insert(job.id.clone(), job);
        self
    }

    /// Allocations are listed in insertion order
    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    /// Make the allocation list call fail
    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make the detail lookup for one allocation fail
    pub fn fail_allocation(mut self, id: impl Into<String>) -> Self {
        self.failing_allocations.insert(id.into());
        self
    }

    /// Make restarting one allocation fail
    pub fn fail_restart(mut self, id: impl Into<String>) -> Self {
        self.failing_restarts.insert(id.into());
        self
    }

    /// Delay every listing and detail lookup
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// IDs of the allocations restarted so far, in call order
    pub fn restarted(&self) -> Vec<String> {
        self.restarted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of trait calls served
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// A small homelab-like cluster for local development
    pub fn sample() -> Self {
        let traefik_tags = |host: &str| {
            vec![
                "traefik.enable=true".to_string(),
                format!("traefik.http.routers.{}.rule=Host(`{}`)", host, host),
            ]
        };

        let grafana = Job {
            id: "grafana".to_string(),
            name: "grafana".to_string(),
            task_groups: vec![TaskGroup {
                name: "grafana".to_string(),
                networks: vec![NetworkResource {
                    dynamic_ports: vec![Port {
                        label: "http".to_string(),
                        value: 0,
                        to: 3000,
                    }],
                    reserved_ports: vec![],
                }],
                services: vec![Service {
                    name: "grafana".to_string(),
                    tags: {
                        let mut tags = traefik_tags("grafana.example.com");
                        tags.push("icon=mdi:chart-line".to_string());
                        tags
                    },
                }],
                tasks: vec![Task {
                    name: "grafana".to_string(),
                    services: vec![],
                }],
            }],
        };

        let traefik = Job {
            id: "traefik".to_string(),
            name: "traefik".to_string(),
            task_groups: vec![TaskGroup {
                name: "traefik".to_string(),
                networks: vec![NetworkResource {
                    dynamic_ports: vec![],
                    reserved_ports: vec![
                        Port {
                            label: "http".to_string(),
                            value: 80,
                            to: 0,
                        },
                        Port {
                            label: "admin".to_string(),
                            value: 8081,
                            to: 0,
                        },
                    ],
                }],
                services: vec![],
                tasks: vec![Task {
                    name: "traefik".to_string(),
                    services: vec![],
                }],
            }],
        };

        let grafana_alloc = Allocation {
            id: "4c1a0f5e".to_string(),
            job_id: "grafana".to_string(),
            node_id: "zeus".to_string(),
            task_group: "grafana".to_string(),
            resources: AllocationResources {
                networks: vec![NetworkResource {
                    dynamic_ports: vec![Port {
                        label: "http".to_string(),
                        value: 24680,
                        to: 3000,
                    }],
                    reserved_ports: vec![],
                }],
            },
            ..Default::default()
        };

        let traefik_alloc = Allocation {
            id: "9e2b7d31".to_string(),
            job_id: "traefik".to_string(),
            node_id: "zeus".to_string(),
            task_group: "traefik".to_string(),
            ..Default::default()
        };

        Self::new()
            .with_node(Node {
                id: "zeus".to_string(),
                name: "zeus".to_string(),
                http_addr: "127.0.0.1:4646".to_string(),
            })
            .with_job(grafana)
            .with_job(traefik)
            .with_allocation(grafana_alloc)
            .with_allocation(traefik_alloc)
    }

    fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl NomadClientTrait for InMemoryNomadClient {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, ClientError> {
        self.record_call();
        self.simulate_latency().await;
        if self.fail_listing {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        Ok(self.allocations.iter().map(Allocation::stub).collect())
    }

    async fn get_allocation(&self, id: &str) -> Result<Allocation, ClientError> {
        self.record_call();
        self.simulate_latency().await;
        if self.failing_allocations.contains(id) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("allocation {} lookup failed", id),
            });
        }
        self.allocations
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("allocation {}", id)))
    }

    async fn get_node(&self, id: &str) -> Result<Node, ClientError> {
        self.record_call();
        self.nodes
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("node {}", id)))
    }

    async fn get_job(&self, id: &str) -> Result<Job, ClientError> {
        self.record_call();
        self.jobs
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("job {}", id)))
    }

    async fn restart_allocation(&self, id: &str, _task_name: &str) -> Result<(), ClientError> {
        self.record_call();
        if self.failing_restarts.contains(id) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("restart of {} failed", id),
            });
        }
        self.restarted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_cluster_is_consistent() {
        let client = InMemoryNomadClient::sample();
        let stubs = client.list_allocations().await.unwrap();
        assert_eq!(stubs.len(), 2);

        for stub in stubs {
            assert!(client.get_allocation(&stub.id).await.is_ok());
            assert!(client.get_node(&stub.node_id).await.is_ok());
            assert!(client.get_job(&stub.job_id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_found() {
        let client = InMemoryNomadClient::new();
        assert!(matches!(
            client.get_job("nope").await,
            Err(ClientError::NotFound(_))
        ));
        assert!(matches!(
            client.get_node("nope").await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_tracking() {
        let client = InMemoryNomadClient::new().fail_restart("b");
        client.restart_allocation("a", "").await.unwrap();
        assert!(client.restart_allocation("b", "").await.is_err());
        assert_eq!(client.restarted(), vec!["a".to_string()]);
        assert_eq!(client.call_count(), 2);
    }
}
