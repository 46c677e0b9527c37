//! Metrics collection loop
//!
//! Drives discovery refreshes and one collection cycle per polling interval.
//! A cycle that runs past its interval is abandoned and writes nothing.

use super::aggregator::{CollectedMetrics, CycleWindow, MetricsAggregator, SkipReason, SkippedField};
use super::aggregator::{DEFAULT_CLOCK_SKEW_SECS, DEFAULT_LOOKBACK_SECS};
use crate::accounts::AccountRegistry;
use crate::error::StoreError;
use crate::health::{DiscoveryOutcome, HealthRegistry};
use crate::inventory::{InventoryBuilder, InventoryCache, InventorySink};
use crate::models::{AccountCredentials, InventoryGraph};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::store::TimeSeriesStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Polling interval, also the cycle timeout (default: 300 seconds)
    pub interval: Duration,
    /// Metric lookback per cycle in seconds (default: 300)
    pub lookback_secs: u32,
    /// Extra seconds added to the window start (default: 5)
    pub clock_skew_secs: u32,
    /// Inventory older than this is rediscovered (default: 1 hour)
    pub discovery_interval: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            lookback_secs: DEFAULT_LOOKBACK_SECS,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            discovery_interval: Duration::from_secs(3600),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        accounts: usize,
        samples_written: usize,
        skipped: Vec<SkippedField>,
    },
    /// Ran past the interval; nothing was written
    Abandoned,
}

/// Account snapshot taken at the start of a cycle
struct Target {
    name: String,
    credentials: AccountCredentials,
    graph: InventoryGraph,
}

/// Periodic discovery + collection driver
pub struct CollectionLoop {
    accounts: AccountRegistry,
    builder: InventoryBuilder,
    aggregator: MetricsAggregator,
    store: Arc<TimeSeriesStore>,
    cache: InventoryCache,
    sinks: Vec<Arc<dyn InventorySink>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: AgentMetrics,
    config: CollectionConfig,
    last_discovery: HashMap<String, Instant>,
}

impl CollectionLoop {
    /// Start the collection loop, running until `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            discovery_interval_secs = self.config.discovery_interval.as_secs(),
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
            }
        }

        if let Err(e) = self.store.flush() {
            warn!(error = %e, "Failed to flush series on shutdown");
        }
    }

    /// Run one cycle: refresh stale inventories, collect, write, flush
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle whose metric window ends at `end`
    pub async fn run_cycle_at(&mut self, end: DateTime<Utc>) -> CycleOutcome {
        let start = Instant::now();
        let targets = self.refresh_inventories().await;

        let window = CycleWindow::new(end, self.config.lookback_secs, self.config.clock_skew_secs);
        let collected = match tokio::time::timeout(
            self.config.interval,
            self.collect_all(&targets, &window),
        )
        .await
        {
            Ok(collected) => collected,
            Err(_) => {
                self.metrics.inc_cycles_abandoned();
                self.logger
                    .log_cycle_abandoned(self.config.interval.as_secs());
                self.health.record_abandoned_cycle().await;
                return CycleOutcome::Abandoned;
            }
        };

        let mut samples_written = 0;
        let mut skipped = Vec::new();
        for (_, result) in collected {
            let (written, rejected) = self.write(&result);
            samples_written += written;
            skipped.extend(result.skipped);
            skipped.extend(rejected);
        }

        let flushed = self.store.flush();
        if let Err(e) = &flushed {
            warn!(error = %e, "Failed to flush series");
        }
        self.health.record_flush(&flushed).await;
        self.health.record_cycle(skipped.len()).await;

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_duration(elapsed.as_secs_f64());
        self.logger.log_collection_cycle(
            targets.len(),
            samples_written,
            skipped.len(),
            elapsed.as_millis() as u64,
        );

        CycleOutcome::Completed {
            accounts: targets.len(),
            samples_written,
            skipped,
        }
    }

    /// Rediscover accounts whose inventory is missing or stale
    async fn refresh_inventories(&mut self) -> Vec<Target> {
        let mut targets = Vec::new();

        for account in self.accounts.list().await {
            let Some(credentials) = self.accounts.credentials(&account.name).await else {
                continue;
            };

            let stale = self
                .last_discovery
                .get(&account.name)
                .map(|at| at.elapsed() >= self.config.discovery_interval)
                .unwrap_or(true);
            if stale {
                self.discover(&account.name, &credentials).await;
            }

            match self.cache.get(&account.name).await {
                Some(report) => targets.push(Target {
                    name: account.name,
                    credentials,
                    graph: report.graph,
                }),
                None => debug!(account = %account.name, "No inventory yet, skipping collection"),
            }
        }

        targets
    }

    async fn discover(&mut self, account: &str, credentials: &AccountCredentials) {
        match self.builder.discover(account, credentials).await {
            Ok(report) => {
                self.last_discovery
                    .insert(account.to_string(), Instant::now());
                self.logger.log_discovery(
                    account,
                    report.graph.regions.len(),
                    report.failed_regions.len(),
                    report.graph.instance_count(),
                    report.discover_guests,
                );

                if let Err(e) = self.cache.apply(&report).await {
                    warn!(account = %account, error = %e, "Failed to cache inventory");
                }
                for sink in &self.sinks {
                    if let Err(e) = sink.apply(&report).await {
                        warn!(account = %account, error = %e, "Failed to hand off inventory");
                    }
                }

                let outcome = match report.failed_regions.len() {
                    0 => DiscoveryOutcome::Complete,
                    n => DiscoveryOutcome::RegionsFailed(n),
                };
                self.health.record_discovery(account, outcome).await;
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Inventory discovery failed");
                self.health
                    .record_discovery(account, DiscoveryOutcome::Failed(e.to_string()))
                    .await;
            }
        }
    }

    async fn collect_all(
        &self,
        targets: &[Target],
        window: &CycleWindow,
    ) -> Vec<(String, CollectedMetrics)> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let collected = self
                .aggregator
                .collect(&target.name, &target.credentials, &target.graph, window)
                .await;
            results.push((target.name.clone(), collected));
        }
        results
    }

    /// Write one account's values; returns samples written and rejected fields
    fn write(&self, collected: &CollectedMetrics) -> (usize, Vec<SkippedField>) {
        let timestamp = collected.timestamp.timestamp();
        let mut written = 0;
        let mut rejected = Vec::new();

        for (entity, values) in &collected.values {
            for (field, value) in values {
                match self
                    .store
                    .append(entity, field.series_name(), timestamp, *value)
                {
                    Ok(()) => written += 1,
                    Err(e @ StoreError::UnrecognizedField { .. }) => {
                        rejected.push(SkippedField::new(
                            &entity.to_string(),
                            Some(field.series_name()),
                            SkipReason::Configuration(e.to_string()),
                        ));
                    }
                    Err(e) => {
                        warn!(entity = %entity, field = %field, error = %e, "Failed to write sample");
                    }
                }
            }
        }

        (written, rejected)
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    accounts: Option<AccountRegistry>,
    builder: Option<InventoryBuilder>,
    aggregator: Option<MetricsAggregator>,
    store: Option<Arc<TimeSeriesStore>>,
    cache: InventoryCache,
    sinks: Vec<Arc<dyn InventorySink>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            accounts: None,
            builder: None,
            aggregator: None,
            store: None,
            cache: InventoryCache::new(),
            sinks: Vec::new(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("localhost"),
            config: CollectionConfig::default(),
        }
    }

    pub fn accounts(mut self, accounts: AccountRegistry) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn inventory_builder(mut self, builder: InventoryBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn aggregator(mut self, aggregator: MetricsAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn store(mut self, store: Arc<TimeSeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share the latest inventory per account with other readers
    pub fn cache(mut self, cache: InventoryCache) -> Self {
        self.cache = cache;
        self
    }

    /// Add a sink that receives every discovery report
    pub fn sink(mut self, sink: Arc<dyn InventorySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let accounts = self
            .accounts
            .ok_or_else(|| anyhow::anyhow!("Account registry is required"))?;
        let builder = self
            .builder
            .ok_or_else(|| anyhow::anyhow!("Inventory builder is required"))?;
        let aggregator = self
            .aggregator
            .ok_or_else(|| anyhow::anyhow!("Metrics aggregator is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Time-series store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be greater than zero");
        }

        Ok(CollectionLoop {
            accounts,
            builder,
            aggregator,
            store,
            cache: self.cache,
            sinks: self.sinks,
            health: self.health,
            logger: self.logger,
            metrics: AgentMetrics::new(),
            config: self.config,
            last_discovery: HashMap::new(),
        })
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
