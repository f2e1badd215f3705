//! Extraction coordinator
//!
//! Every operation lists the current allocations and walks them from
//! scratch into a fresh [`ExtractionContext`]. Detail lookups for
//! different allocations overlap, but results are recorded in list order so
//! first-wins deduplication follows the orchestrator's ordering.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{AllocationStub, NomadClientTrait};
use crate::display::format_snapshot;

use super::directory::deduplicate;
use super::walker::{AllocationSnapshot, AllocationWalker, ExtractionContext};
use super::{DiscoveryError, Endpoint};

/// Default number of allocations fetched concurrently
pub const DEFAULT_CONCURRENCY: usize = 8;

/// `{service: url}` for a single service
pub type ServiceStatus = BTreeMap<String, String>;

/// Builds the endpoint directory from orchestrator state
#[derive(Clone)]
pub struct DiscoveryService {
    client: Arc<dyn NomadClientTrait>,
    static_endpoints: Arc<[Endpoint]>,
    concurrency: usize,
}

impl DiscoveryService {
    /// Create a coordinator. Configured endpoints are always marked as not fetched.
    pub fn new(client: Arc<dyn NomadClientTrait>, static_endpoints: Vec<Endpoint>) -> Self {
        let static_endpoints = static_endpoints
            .into_iter()
            .map(|mut endpoint| {
                endpoint.fetched = false;
                endpoint
            })
            .collect();

        Self {
            client,
            static_endpoints,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set how many allocations are fetched at once (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn static_endpoints(&self) -> &[Endpoint] {
        &self.static_endpoints
    }

    // =========================================================================
    // Directory views
    // =========================================================================

    /// All live endpoints plus configured ones, optionally printed as tables
    pub async fn extract_all(
        &self,
        print: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, DiscoveryError> {
        let snapshot = self.snapshot(cancel).await?;

        if print {
            println!("{}", format_snapshot(&snapshot));
        }

        let all = snapshot
            .service_urls()
            .iter()
            .chain(snapshot.host_reserved_ports())
            .chain(snapshot.service_ports())
            .chain(self.static_endpoints.iter())
            .cloned();

        Ok(deduplicate(all))
    }

    /// Routed service URLs plus configured endpoints
    pub async fn extract_urls(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, DiscoveryError> {
        let snapshot = self.snapshot(cancel).await?;

        let urls = snapshot
            .service_urls()
            .iter()
            .chain(self.static_endpoints.iter())
            .cloned();

        Ok(deduplicate(urls))
    }

    /// Endpoints of reserved host ports
    pub async fn extract_host_ports(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, DiscoveryError> {
        let snapshot = self.snapshot(cancel).await?;
        Ok(deduplicate(snapshot.host_reserved_ports().iter().cloned()))
    }

    /// Endpoints of mapped dynamic ports
    pub async fn extract_service_ports(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, DiscoveryError> {
        let snapshot = self.snapshot(cancel).await?;
        Ok(deduplicate(snapshot.service_ports().iter().cloned()))
    }

    /// Look up one service key: routed URLs first, then host ports, then
    /// service ports. `None` when the key is unknown.
    pub async fn service_status(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ServiceStatus>, DiscoveryError> {
        let snapshot = self.snapshot(cancel).await?;

        let found = [
            snapshot.service_urls(),
            snapshot.host_reserved_ports(),
            snapshot.service_ports(),
        ]
        .into_iter()
        .find_map(|bucket| bucket.iter().find(|e| e.service == name));

        if found.is_none() {
            debug!("No endpoint found for service {}", name);
        }

        Ok(found.map(|e| ServiceStatus::from([(e.service.clone(), e.url.clone())])))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Restart every allocation whose job is named `name`.
    ///
    /// Stops at the first failed job lookup or restart; allocations after it
    /// are left alone. Returns the number of restarted allocations.
    pub async fn restart_service_allocations(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, DiscoveryError> {
        cancellable(cancel, self.restart_matching(name)).await
    }

    async fn restart_matching(&self, name: &str) -> Result<usize, DiscoveryError> {
        let allocations = self.list_allocations().await?;
        let mut job_names: HashMap<&str, String> = HashMap::new();
        let mut restarted = 0;

        for stub in &allocations {
            let job_name = match job_names.get(stub.job_id.as_str()) {
                Some(job_name) => job_name.clone(),
                None => {
                    let job = self.client.get_job(&stub.job_id).await.map_err(|source| {
                        error!("Failed to get job info for {}: {}", stub.job_id, source);
                        DiscoveryError::JobLookup {
                            allocation_id: stub.id.clone(),
                            job_id: stub.job_id.clone(),
                            source,
                        }
                    })?;
                    job_names.insert(&stub.job_id, job.name.clone());
                    job.name
                }
            };

            if job_name != name {
                continue;
            }

            info!("Restarting allocation {} of {}", stub.id, name);
            self.client
                .restart_allocation(&stub.id, "")
                .await
                .map_err(|source| {
                    error!("Failed to restart allocation {}: {}", stub.id, source);
                    DiscoveryError::Restart {
                        allocation_id: stub.id.clone(),
                        source,
                    }
                })?;
            restarted += 1;
        }

        if restarted == 0 {
            warn!("No allocations found for service {}", name);
        }

        Ok(restarted)
    }

    // =========================================================================
    // Walk
    // =========================================================================

    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, DiscoveryError> {
        self.client.list_allocations().await.map_err(|e| {
            error!("Failed to list allocations: {}", e);
            DiscoveryError::ListAllocations(e)
        })
    }

    async fn snapshot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AllocationSnapshot, DiscoveryError> {
        cancellable(cancel, self.walk()).await
    }

    async fn walk(&self) -> Result<AllocationSnapshot, DiscoveryError> {
        let allocations = self.list_allocations().await?;
        debug!("Walking {} allocations", allocations.len());

        let walker = AllocationWalker::new(self.client.as_ref());
        let ctx = ExtractionContext::new();

        // Futures are built up front so the stream owns them
        let pending: Vec<_> = allocations
            .iter()
            .map(|stub| walker.process_allocation(stub))
            .collect();
        let mut results = stream::iter(pending).buffered(self.concurrency);

        while let Some(found) = results.next().await {
            if let Some(found) = found {
                ctx.record(found).await;
            }
        }

        Ok(ctx.into_snapshot())
    }
}

/// Race `fut` against the token; a cancelled call yields no partial result.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, DiscoveryError>
where
    F: Future<Output = Result<T, DiscoveryError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("Discovery call cancelled");
            Err(DiscoveryError::Cancelled)
        }
        result = fut => result,
    }
}
