//! Account discovery across regions

use super::transform::{region_inventory, RegionListing};
use crate::error::{DiscoveryError, QueryError};
use crate::models::{AccountCredentials, DiscoveryReport, InventoryGraph, RegionFailure, RegionInventory};
use crate::observability::AgentMetrics;
use crate::provider::{CloudProvider, InstanceFilter, RawRegion, RegionAdapter};
use crate::query::QueryExecutor;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default number of regions discovered at once
pub const DEFAULT_REGION_CONCURRENCY: usize = 4;

/// Builds the inventory graph for an account
pub struct InventoryBuilder {
    provider: Arc<dyn CloudProvider>,
    executor: QueryExecutor,
    region_concurrency: usize,
    metrics: AgentMetrics,
}

impl InventoryBuilder {
    pub fn new(provider: Arc<dyn CloudProvider>, executor: QueryExecutor) -> Self {
        Self {
            provider,
            executor,
            region_concurrency: DEFAULT_REGION_CONCURRENCY,
            metrics: AgentMetrics::new(),
        }
    }

    /// Set how many regions are discovered concurrently
    pub fn region_concurrency(mut self, limit: usize) -> Self {
        self.region_concurrency = limit.max(1);
        self
    }

    /// Discover every region of the account
    ///
    /// A region that fails is reported in `failed_regions`; the others still
    /// make it into the graph.
    pub async fn discover(
        &self,
        account: &str,
        credentials: &AccountCredentials,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        if credentials.access_key.is_empty() {
            return Err(DiscoveryError::MissingCredentials {
                account: account.to_string(),
                key: "access key",
            });
        }
        if credentials.secret_key.is_empty() {
            return Err(DiscoveryError::MissingCredentials {
                account: account.to_string(),
                key: "secret key",
            });
        }

        let start = Instant::now();
        info!(account = %account, "Starting inventory discovery");

        let provider = &self.provider;
        let regions = self
            .executor
            .execute("list_regions", || provider.list_regions(credentials))
            .await
            .map_err(DiscoveryError::RegionListing)?;

        let semaphore = Arc::new(Semaphore::new(self.region_concurrency));
        let mut tasks = JoinSet::new();

        for region in regions {
            let provider = self.provider.clone();
            let executor = self.executor.clone();
            let credentials = credentials.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = discover_region(provider, executor, &credentials, &region).await;
                (region.name, result)
            });
        }

        let mut graph = InventoryGraph::new();
        let mut failed_regions = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(inventory))) => {
                    self.metrics.inc_regions_discovered();
                    graph.insert_region(inventory);
                }
                Ok((region, Err(e))) => {
                    warn!(account = %account, region = %region, error = %e, "Region discovery failed");
                    self.metrics.inc_regions_failed();
                    failed_regions.push(RegionFailure {
                        region,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(account = %account, error = %e, "Region discovery task aborted");
                    self.metrics.inc_regions_failed();
                    failed_regions.push(RegionFailure {
                        region: "unknown".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        failed_regions.sort_by(|a, b| a.region.cmp(&b.region));

        let elapsed = start.elapsed();
        self.metrics.observe_discovery_duration(elapsed.as_secs_f64());
        debug!(
            account = %account,
            regions = graph.regions.len(),
            failed_regions = failed_regions.len(),
            instances = graph.instance_count(),
            volumes = graph.volume_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Inventory discovery complete"
        );

        Ok(DiscoveryReport {
            account: account.to_string(),
            graph,
            failed_regions,
            discover_guests: true,
            discovered_at: chrono::Utc::now(),
        })
    }
}

/// Fetch and transform one region; any listing failure fails the region
async fn discover_region(
    provider: Arc<dyn CloudProvider>,
    executor: QueryExecutor,
    credentials: &AccountCredentials,
    region: &RawRegion,
) -> Result<RegionInventory, QueryError> {
    let client = executor
        .execute("connect", || provider.connect(credentials, region))
        .await?;
    let adapter = RegionAdapter::new(client, executor);
    let filter = InstanceFilter::active();

    let listing = RegionListing {
        zones: adapter.zones().await?,
        vpcs: adapter.vpcs().await?,
        subnets: adapter.subnets().await?,
        reservations: adapter.instances(&filter).await?,
        volumes: adapter.volumes().await?,
    };

    debug!(
        region = %region.name,
        zones = listing.zones.len(),
        vpcs = listing.vpcs.len(),
        subnets = listing.subnets.len(),
        reservations = listing.reservations.len(),
        volumes = listing.volumes.len(),
        "Region listings fetched"
    );

    Ok(region_inventory(region, listing, &filter))
}
