//! Allocation walking
//!
//! For one allocation: fetch its detail, node and job, then run the port
//! resolver and tag parser over every task group and service definition of
//! the job. Results are recorded into a per-call [`AllocationSnapshot`]
//! guarded by [`ExtractionContext`].

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::client::{Allocation, AllocationStub, Job, Node, NomadClientTrait, Service};

use super::ports::{resolve_reserved_ports, resolve_service_ports};
use super::tags::{extract_icon, extract_routing_url};
use super::{service_key, Endpoint};

/// Endpoints found in a single allocation, before they are recorded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationEndpoints {
    pub service_urls: Vec<Endpoint>,
    pub host_ports: Vec<Endpoint>,
    pub service_ports: Vec<Endpoint>,
    /// `(service key, icon)` pairs, applied once the URLs are recorded
    pub icons: Vec<(String, String)>,
}

/// The three buckets built up during one extraction call
#[derive(Debug, Clone, Default)]
pub struct AllocationSnapshot {
    service_urls: Vec<Endpoint>,
    host_reserved_ports: Vec<Endpoint>,
    service_ports: Vec<Endpoint>,
}

impl AllocationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_urls(&self) -> &[Endpoint] {
        &self.service_urls
    }

    pub fn host_reserved_ports(&self) -> &[Endpoint] {
        &self.host_reserved_ports
    }

    pub fn service_ports(&self) -> &[Endpoint] {
        &self.service_ports
    }

    /// Append one allocation's endpoints, then attach its icons.
    ///
    /// An icon goes to the first recorded URL endpoint with the same key and
    /// only if that endpoint has no icon yet. Icons without a URL endpoint
    /// are dropped.
    pub fn record(&mut self, found: AllocationEndpoints) {
        self.service_urls.extend(found.service_urls);
        self.host_reserved_ports.extend(found.host_ports);
        self.service_ports.extend(found.service_ports);

        for (key, icon) in found.icons {
            match self.service_urls.iter_mut().find(|e| e.service == key) {
                Some(endpoint) if endpoint.icon.is_none() => endpoint.icon = Some(icon),
                Some(_) => {}
                None => debug!("Dropping icon {} for {}: no routed URL", icon, key),
            }
        }
    }
}

/// Concurrency guard around one call's snapshot.
///
/// The lock is only taken to record results or take the snapshot out, never
/// across orchestrator calls.
#[derive(Debug, Default)]
pub struct ExtractionContext {
    snapshot: Mutex<AllocationSnapshot>,
}

impl ExtractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, found: AllocationEndpoints) {
        self.snapshot.lock().await.record(found);
    }

    pub fn into_snapshot(self) -> AllocationSnapshot {
        self.snapshot.into_inner()
    }
}

// ============================================================================
// SBIO: Pure extraction (no I/O)
// ============================================================================

/// Service definitions of a job with their owner names, group level first.
///
/// The owner is the declared service name, falling back to the task or
/// group name when the service is unnamed.
fn service_definitions(job: &Job) -> Vec<(&str, &Service)> {
    let mut definitions = Vec::new();

    for group in &job.task_groups {
        for service in &group.services {
            definitions.push((owner_name(service, &group.name), service));
        }
        for task in &group.tasks {
            for service in &task.services {
                definitions.push((owner_name(service, &task.name), service));
            }
        }
    }

    definitions
}

fn owner_name<'a>(service: &'a Service, fallback: &'a str) -> &'a str {
    if service.name.is_empty() {
        fallback
    } else {
        &service.name
    }
}

/// Everything one allocation contributes to the directory
pub fn extract_endpoints(allocation: &Allocation, node: &Node, job: &Job) -> AllocationEndpoints {
    let mut found = AllocationEndpoints::default();
    let bindings = allocation.port_bindings();

    for group in &job.task_groups {
        let Some(network) = group.network() else {
            continue;
        };
        found.service_ports.extend(resolve_service_ports(
            network,
            &bindings,
            &node.http_addr,
            &job.name,
        ));
        found
            .host_ports
            .extend(resolve_reserved_ports(network, &node.http_addr, &job.name));
    }

    let definitions = service_definitions(job);

    for (owner, service) in &definitions {
        if let Some(url) = extract_routing_url(&service.tags) {
            found
                .service_urls
                .push(Endpoint::fetched(service_key(&job.name, owner), url));
        }
    }

    for (owner, service) in &definitions {
        if let Some(icon) = extract_icon(&service.tags) {
            found.icons.push((service_key(&job.name, owner), icon));
        }
    }

    found
}

// ============================================================================
// SBIO: I/O wrapper
// ============================================================================

/// Walks single allocations against an orchestrator client
pub struct AllocationWalker<'a> {
    client: &'a dyn NomadClientTrait,
}

impl<'a> AllocationWalker<'a> {
    pub fn new(client: &'a dyn NomadClientTrait) -> Self {
        Self { client }
    }

    /// Fetch and extract one allocation.
    ///
    /// Lookup failures are logged and yield `None`; they never abort the
    /// surrounding walk.
    pub async fn process_allocation(&self, stub: &AllocationStub) -> Option<AllocationEndpoints> {
        let (allocation, node, job) = tokio::join!(
            self.client.get_allocation(&stub.id),
            self.client.get_node(&stub.node_id),
            self.client.get_job(&stub.job_id),
        );

        let allocation = allocation
            .map_err(|e| error!("Failed to get allocation info for {}: {}", stub.id, e))
            .ok()?;
        let node = node
            .map_err(|e| {
                error!(
                    "Failed to get node info for {} (allocation {}): {}",
                    stub.node_id, stub.id, e
                )
            })
            .ok()?;
        let job = job
            .map_err(|e| {
                error!(
                    "Failed to get job info for {} (allocation {}): {}",
                    stub.job_id, stub.id, e
                )
            })
            .ok()?;

        let found = extract_endpoints(&allocation, &node, &job);
        debug!(
            "Allocation {} ({}): {} urls, {} host ports, {} service ports",
            stub.id,
            job.name,
            found.service_urls.len(),
            found.host_ports.len(),
            found.service_ports.len()
        );
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        AllocationResources, InMemoryNomadClient, NetworkResource, Port, Task, TaskGroup,
    };

    fn routed(name: &str, host: &str) -> Service {
        Service {
            name: name.to_string(),
            tags: vec![
                "traefik.enable=true".to_string(),
                format!("traefik.http.routers.{}.rule=Host(`{}`)", name, host),
            ],
        }
    }

    fn job_with_task_service(job: &str, service: Service) -> Job {
        Job {
            id: job.to_string(),
            name: job.to_string(),
            task_groups: vec![TaskGroup {
                name: job.to_string(),
                tasks: vec![Task {
                    name: job.to_string(),
                    services: vec![service],
                }],
                ..Default::default()
            }],
        }
    }

    fn node() -> Node {
        Node {
            id: "n1".to_string(),
            name: "zeus".to_string(),
            http_addr: "10.0.0.5:4646".to_string(),
        }
    }

    #[test]
    fn test_service_named_after_job() {
        let job = job_with_task_service("web", routed("web", "app.example.com"));
        let found = extract_endpoints(&Allocation::default(), &node(), &job);
        assert_eq!(
            found.service_urls,
            vec![Endpoint::fetched("web", "https://app.example.com")]
        );
    }

    #[test]
    fn test_service_named_differently_from_job() {
        let job = job_with_task_service("web", routed("api", "app.example.com"));
        let found = extract_endpoints(&Allocation::default(), &node(), &job);
        assert_eq!(
            found.service_urls,
            vec![Endpoint::fetched("web-api", "https://app.example.com")]
        );
    }

    #[test]
    fn test_unnamed_service_uses_task_name() {
        let mut job = job_with_task_service("web", routed("", "app.example.com"));
        job.task_groups[0].tasks[0].name = "frontend".to_string();

        let found = extract_endpoints(&Allocation::default(), &node(), &job);
        assert_eq!(found.service_urls[0].service, "web-frontend");
    }

    #[test]
    fn test_group_services_come_before_task_services() {
        let job = Job {
            id: "media".to_string(),
            name: "media".to_string(),
            task_groups: vec![TaskGroup {
                name: "media".to_string(),
                services: vec![routed("media", "group.example.com")],
                tasks: vec![Task {
                    name: "media".to_string(),
                    services: vec![routed("media", "task.example.com")],
                }],
                ..Default::default()
            }],
        };

        let found = extract_endpoints(&Allocation::default(), &node(), &job);
        assert_eq!(found.service_urls.len(), 2);
        assert_eq!(found.service_urls[0].url, "https://group.example.com");
    }

    #[test]
    fn test_ports_resolved_for_every_networked_group() {
        let allocation = Allocation {
            resources: AllocationResources {
                networks: vec![NetworkResource {
                    dynamic_ports: vec![Port {
                        label: "http".to_string(),
                        value: 8080,
                        to: 80,
                    }],
                    reserved_ports: vec![],
                }],
            },
            ..Default::default()
        };
        let job = Job {
            id: "web".to_string(),
            name: "web".to_string(),
            task_groups: vec![
                TaskGroup {
                    name: "web".to_string(),
                    networks: vec![NetworkResource {
                        dynamic_ports: vec![Port {
                            label: "http".to_string(),
                            value: 0,
                            to: 80,
                        }],
                        reserved_ports: vec![Port {
                            label: "metrics".to_string(),
                            value: 9100,
                            to: 0,
                        }],
                    }],
                    ..Default::default()
                },
                TaskGroup {
                    name: "worker".to_string(),
                    ..Default::default()
                },
            ],
        };

        let found = extract_endpoints(&allocation, &node(), &job);
        assert_eq!(
            found.service_ports,
            vec![Endpoint::fetched("web-http", "10.0.0.5:8080")]
        );
        assert_eq!(
            found.host_ports,
            vec![Endpoint::fetched("web-metrics", "10.0.0.5:9100")]
        );
    }

    #[test]
    fn test_icon_attaches_to_recorded_url() {
        let mut service = routed("web", "app.example.com");
        service.tags.push("icon=mdi:server".to_string());
        let job = job_with_task_service("web", service);

        let mut snapshot = AllocationSnapshot::new();
        snapshot.record(extract_endpoints(&Allocation::default(), &node(), &job));

        assert_eq!(snapshot.service_urls()[0].icon.as_deref(), Some("mdi:server"));
    }

    #[test]
    fn test_icon_without_url_is_dropped() {
        let service = Service {
            name: "web".to_string(),
            tags: vec!["icon=mdi:server".to_string()],
        };
        let job = job_with_task_service("web", service);

        let found = extract_endpoints(&Allocation::default(), &node(), &job);
        assert_eq!(found.icons.len(), 1);

        let mut snapshot = AllocationSnapshot::new();
        snapshot.record(found);
        assert!(snapshot.service_urls().is_empty());
    }

    #[test]
    fn test_icon_attaches_to_url_from_earlier_allocation() {
        let mut snapshot = AllocationSnapshot::new();
        snapshot.record(AllocationEndpoints {
            service_urls: vec![Endpoint::fetched("web", "https://app.example.com")],
            ..Default::default()
        });
        snapshot.record(AllocationEndpoints {
            icons: vec![("web".to_string(), "mdi:web".to_string())],
            ..Default::default()
        });

        assert_eq!(snapshot.service_urls()[0].icon.as_deref(), Some("mdi:web"));
    }

    #[tokio::test]
    async fn test_context_records_in_call_order() {
        let ctx = ExtractionContext::new();
        ctx.record(AllocationEndpoints {
            host_ports: vec![Endpoint::fetched("dns-dns", "10.0.0.5:53")],
            ..Default::default()
        })
        .await;
        ctx.record(AllocationEndpoints {
            host_ports: vec![Endpoint::fetched("dns-dns", "10.0.0.6:53")],
            ..Default::default()
        })
        .await;

        let snapshot = ctx.into_snapshot();
        assert_eq!(snapshot.host_reserved_ports()[0].url, "10.0.0.5:53");
        assert_eq!(snapshot.host_reserved_ports().len(), 2);
    }

    #[tokio::test]
    async fn test_walker_skips_failed_lookups() {
        let job = job_with_task_service("web", routed("web", "app.example.com"));
        let allocation = Allocation {
            id: "a1".to_string(),
            job_id: "web".to_string(),
            node_id: "n1".to_string(),
            ..Default::default()
        };
        let client = InMemoryNomadClient::new()
            .with_node(node())
            .with_job(job)
            .with_allocation(allocation.clone())
            .fail_allocation("a1");

        let walker = AllocationWalker::new(&client);
        assert!(walker.process_allocation(&allocation.stub()).await.is_none());
    }

    #[tokio::test]
    async fn test_walker_missing_node() {
        let job = job_with_task_service("web", routed("web", "app.example.com"));
        let allocation = Allocation {
            id: "a1".to_string(),
            job_id: "web".to_string(),
            node_id: "gone".to_string(),
            ..Default::default()
        };
        let client = InMemoryNomadClient::new()
            .with_job(job)
            .with_allocation(allocation.clone());

        let walker = AllocationWalker::new(&client);
        assert!(walker.process_allocation(&allocation.stub()).await.is_none());
    }
}
