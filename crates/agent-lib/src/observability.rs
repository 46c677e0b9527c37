//! Observability infrastructure for the EC2 agent
//!
//! Provides:
//! - Prometheus metrics (discovery and cycle latency, throttling, series writes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for discovery and collection cycles (in seconds)
const CYCLE_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    discovery_duration_seconds: Histogram,
    regions_discovered: IntCounter,
    regions_failed: IntCounter,
    cycle_duration_seconds: Histogram,
    cycles_abandoned: IntCounter,
    provider_retries: IntCounter,
    permanently_throttled: IntCounter,
    skipped_fields: IntCounter,
    series_written: IntCounter,
    series_count: IntGauge,
    accounts_registered: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            discovery_duration_seconds: register_histogram!(
                "ec2_agent_discovery_duration_seconds",
                "Time spent discovering the inventory of one account",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register discovery_duration_seconds"),

            regions_discovered: register_int_counter!(
                "ec2_agent_regions_discovered_total",
                "Regions whose inventory was discovered successfully"
            )
            .expect("Failed to register regions_discovered"),

            regions_failed: register_int_counter!(
                "ec2_agent_regions_failed_total",
                "Regions whose discovery failed"
            )
            .expect("Failed to register regions_failed"),

            cycle_duration_seconds: register_histogram!(
                "ec2_agent_collection_cycle_duration_seconds",
                "Time spent in one metrics collection cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_abandoned: register_int_counter!(
                "ec2_agent_collection_cycles_abandoned_total",
                "Collection cycles abandoned for exceeding the polling interval"
            )
            .expect("Failed to register cycles_abandoned"),

            provider_retries: register_int_counter!(
                "ec2_agent_provider_retries_total",
                "Provider calls retried after throttling"
            )
            .expect("Failed to register provider_retries"),

            permanently_throttled: register_int_counter!(
                "ec2_agent_provider_permanently_throttled_total",
                "Provider calls still throttled after every retry"
            )
            .expect("Failed to register permanently_throttled"),

            skipped_fields: register_int_counter!(
                "ec2_agent_skipped_fields_total",
                "Metric fields left out of a collection cycle"
            )
            .expect("Failed to register skipped_fields"),

            series_written: register_int_counter!(
                "ec2_agent_series_samples_written_total",
                "Samples written to the time-series store"
            )
            .expect("Failed to register series_written"),

            series_count: register_int_gauge!(
                "ec2_agent_series",
                "Number of series in the time-series store"
            )
            .expect("Failed to register series_count"),

            accounts_registered: register_int_gauge!(
                "ec2_agent_accounts_registered",
                "Number of registered accounts"
            )
            .expect("Failed to register accounts_registered"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Debug, Clone)]
pub struct AgentMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_discovery_duration(&self, duration_secs: f64) {
        self.inner().discovery_duration_seconds.observe(duration_secs);
    }

    pub fn inc_regions_discovered(&self) {
        self.inner().regions_discovered.inc();
    }

    pub fn inc_regions_failed(&self) {
        self.inner().regions_failed.inc();
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_abandoned(&self) {
        self.inner().cycles_abandoned.inc();
    }

    pub fn inc_provider_retries(&self) {
        self.inner().provider_retries.inc();
    }

    pub fn inc_permanently_throttled(&self) {
        self.inner().permanently_throttled.inc();
    }

    pub fn inc_skipped_fields(&self, count: u64) {
        self.inner().skipped_fields.inc_by(count);
    }

    pub fn inc_series_written(&self) {
        self.inner().series_written.inc();
    }

    pub fn set_series_count(&self, count: i64) {
        self.inner().series_count.set(count);
    }

    pub fn set_accounts_registered(&self, count: i64) {
        self.inner().accounts_registered.set(count);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for discovery runs,
/// collection cycles and other significant events.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    collector_name: String,
}

impl StructuredLogger {
    pub fn new(collector_name: impl Into<String>) -> Self {
        Self {
            collector_name: collector_name.into(),
        }
    }

    /// Log the outcome of a discovery run
    pub fn log_discovery(
        &self,
        account: &str,
        regions: usize,
        failed_regions: usize,
        instances: usize,
        discover_guests: bool,
    ) {
        if failed_regions > 0 {
            warn!(
                event = "discovery_completed",
                collector = %self.collector_name,
                account = %account,
                regions = regions,
                failed_regions = failed_regions,
                instances = instances,
                discover_guests = discover_guests,
                "Inventory refreshed with failed regions"
            );
        } else {
            info!(
                event = "discovery_completed",
                collector = %self.collector_name,
                account = %account,
                regions = regions,
                instances = instances,
                discover_guests = discover_guests,
                "Inventory refreshed"
            );
        }
    }

    /// Log a completed collection cycle
    pub fn log_collection_cycle(
        &self,
        accounts: usize,
        samples_written: usize,
        skipped_fields: usize,
        elapsed_ms: u64,
    ) {
        info!(
            event = "collection_cycle",
            collector = %self.collector_name,
            accounts = accounts,
            samples_written = samples_written,
            skipped_fields = skipped_fields,
            elapsed_ms = elapsed_ms,
            "Collection cycle complete"
        );
    }

    /// Log a cycle abandoned for running past its interval
    pub fn log_cycle_abandoned(&self, interval_secs: u64) {
        warn!(
            event = "cycle_abandoned",
            collector = %self.collector_name,
            interval_secs = interval_secs,
            "Collection cycle exceeded its interval, results discarded"
        );
    }

    /// Log an account registration from the management API
    pub fn log_account_registered(&self, account: &str, collector: &str) {
        info!(
            event = "account_registered",
            collector = %collector,
            account = %account,
            "Account registered"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, accounts: usize) {
        info!(
            event = "agent_started",
            collector = %self.collector_name,
            agent_version = %version,
            accounts = accounts,
            "EC2 agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            collector = %self.collector_name,
            reason = %reason,
            "EC2 agent shutting down"
        );
    }
}
