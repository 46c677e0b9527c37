//! Fan-out metrics aggregation
//!
//! One cycle queries every instance and every attached volume, then rolls
//! the results up: volume -> instance -> instance type -> account.

use super::fields::MetricField;
use crate::error::QueryError;
use crate::models::{AccountCredentials, EntityId, InventoryGraph};
use crate::observability::AgentMetrics;
use crate::provider::{
    CloudProvider, Consolidation, Datapoint, MetricDimension, MetricQuery, RawRegion,
    RegionAdapter,
};
use crate::query::QueryExecutor;
use crate::store::SeriesEntity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const DEFAULT_LOOKBACK_SECS: u32 = 300;
pub const DEFAULT_CLOCK_SKEW_SECS: u32 = 5;
pub const DEFAULT_QUERY_CONCURRENCY: usize = 8;

/// Time range queried in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Consolidation period, equal to the lookback
    pub period_secs: u32,
}

impl CycleWindow {
    /// Window of `lookback_secs` ending at `end`, widened by the clock skew
    pub fn new(end: DateTime<Utc>, lookback_secs: u32, clock_skew_secs: u32) -> Self {
        Self {
            start: end - Duration::seconds(i64::from(lookback_secs) + i64::from(clock_skew_secs)),
            end,
            period_secs: lookback_secs,
        }
    }

    pub fn ending_now(lookback_secs: u32, clock_skew_secs: u32) -> Self {
        Self::new(Utc::now(), lookback_secs, clock_skew_secs)
    }
}

/// Why a field is missing from this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Still throttled after every retry
    Throttled,
    Provider(String),
    Configuration(String),
}

impl From<&QueryError> for SkipReason {
    fn from(err: &QueryError) -> Self {
        match err {
            QueryError::PermanentlyThrottled { .. } => SkipReason::Throttled,
            QueryError::Provider(e) => SkipReason::Provider(e.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttled => f.write_str("throttled"),
            Self::Provider(msg) => write!(f, "provider error: {}", msg),
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

/// A field left out of this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedField {
    /// Provider id of the instance, volume or region
    pub entity: String,
    /// `None` when nothing could be read for the entity
    pub field: Option<String>,
    pub reason: SkipReason,
}

impl SkippedField {
    pub fn new(entity: &str, field: Option<&str>, reason: SkipReason) -> Self {
        match &reason {
            SkipReason::Throttled => {
                debug!(entity = %entity, field = ?field, "Skipping throttled field this cycle")
            }
            _ => {
                warn!(entity = %entity, field = ?field, reason = %reason, "Skipping field this cycle")
            }
        }
        Self {
            entity: entity.to_string(),
            field: field.map(str::to_string),
            reason,
        }
    }
}

pub type FieldValues = BTreeMap<MetricField, f64>;

/// Output of one collection cycle
#[derive(Debug, Clone, Default)]
pub struct CollectedMetrics {
    pub values: BTreeMap<SeriesEntity, FieldValues>,
    pub skipped: Vec<SkippedField>,
    pub timestamp: DateTime<Utc>,
}

impl CollectedMetrics {
    pub fn get(&self, entity: &SeriesEntity, field: MetricField) -> Option<f64> {
        self.values.get(entity).and_then(|v| v.get(&field)).copied()
    }

    /// Number of (entity, field) values
    pub fn sample_count(&self) -> usize {
        self.values.values().map(|v| v.len()).sum()
    }
}

/// Which allowlist a queried entity uses
#[derive(Debug, Clone, Copy)]
enum Source {
    Instance,
    Volume,
}

impl Source {
    fn field_for(&self, metric: &str) -> Option<MetricField> {
        match self {
            Source::Instance => MetricField::from_instance_metric(metric),
            Source::Volume => MetricField::from_volume_metric(metric),
        }
    }
}

/// Per-entity unit of work; `owner` is the instance the result belongs to
struct Fetch {
    owner: (EntityId, EntityId),
    source: Source,
    dimension: MetricDimension,
}

/// Queries the provider for every entity in a graph and rolls results up
pub struct MetricsAggregator {
    provider: Arc<dyn CloudProvider>,
    executor: QueryExecutor,
    query_concurrency: usize,
    consolidation: Consolidation,
    metrics: AgentMetrics,
}

impl MetricsAggregator {
    pub fn new(provider: Arc<dyn CloudProvider>, executor: QueryExecutor) -> Self {
        Self {
            provider,
            executor,
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
            consolidation: Consolidation::default(),
            metrics: AgentMetrics::new(),
        }
    }

    /// Set how many entities are queried concurrently
    pub fn query_concurrency(mut self, limit: usize) -> Self {
        self.query_concurrency = limit.max(1);
        self
    }

    pub fn consolidation(mut self, consolidation: Consolidation) -> Self {
        self.consolidation = consolidation;
        self
    }

    /// Run one cycle over `graph`
    ///
    /// Never fails as a whole: anything that could not be read is reported
    /// in `skipped` and left out of `values`.
    pub async fn collect(
        &self,
        account: &str,
        credentials: &AccountCredentials,
        graph: &InventoryGraph,
        window: &CycleWindow,
    ) -> CollectedMetrics {
        let mut collected = CollectedMetrics {
            timestamp: window.end,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.query_concurrency));
        let mut tasks = JoinSet::new();

        for (region_id, region) in &graph.regions {
            if region.instances.is_empty() {
                continue;
            }

            let raw_region = RawRegion {
                name: region.region.title.clone(),
                endpoint: None,
            };
            let provider = &self.provider;
            let client = match self
                .executor
                .execute("connect", || provider.connect(credentials, &raw_region))
                .await
            {
                Ok(client) => client,
                Err(e) => {
                    collected.skipped.push(SkippedField::new(
                        &region.region.title,
                        None,
                        SkipReason::from(&e),
                    ));
                    continue;
                }
            };
            let adapter = RegionAdapter::new(client, self.executor.clone());

            let mut fetches = Vec::new();
            for (instance_id, instance) in &region.instances {
                let owner = (region_id.clone(), instance_id.clone());
                fetches.push(Fetch {
                    owner: owner.clone(),
                    source: Source::Instance,
                    dimension: MetricDimension::InstanceId(instance.instance_id.clone()),
                });
                for volume in region.volumes_attached_to(instance_id) {
                    fetches.push(Fetch {
                        owner: owner.clone(),
                        source: Source::Volume,
                        dimension: MetricDimension::VolumeId(volume.volume_id.clone()),
                    });
                }
            }

            for fetch in fetches {
                let adapter = adapter.clone();
                let semaphore = semaphore.clone();
                let window = *window;
                let consolidation = self.consolidation;

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let (values, skipped) =
                        fetch_entity(&adapter, &fetch, &window, consolidation).await;
                    (fetch, values, skipped)
                });
            }
        }

        let mut instance_values: HashMap<(EntityId, EntityId), FieldValues> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((fetch, values, skipped)) => {
                    collected.skipped.extend(skipped);
                    let entry = instance_values.entry(fetch.owner).or_default();
                    for (field, value) in values {
                        // Volume fields sum into the instance; instance fields are unique
                        *entry.entry(field).or_insert(0.0) += value;
                    }
                }
                Err(e) => {
                    warn!(account = %account, error = %e, "Metric fetch task aborted");
                }
            }
        }

        let account_entity = SeriesEntity::account(account);
        for ((region_id, instance_id), values) in instance_values {
            if values.is_empty() {
                continue;
            }
            let Some(instance) = graph
                .regions
                .get(&region_id)
                .and_then(|r| r.instances.get(&instance_id))
            else {
                continue;
            };

            let rollups = [
                SeriesEntity::instance_type(&instance.instance_type),
                account_entity.clone(),
            ];
            for rollup in rollups {
                let totals = collected.values.entry(rollup).or_default();
                for (field, value) in &values {
                    *totals.entry(*field).or_insert(0.0) += value;
                }
            }
            collected
                .values
                .insert(SeriesEntity::instance(&region_id, &instance_id), values);
        }

        self.metrics.inc_skipped_fields(collected.skipped.len() as u64);
        debug!(
            account = %account,
            entities = collected.values.len(),
            values = collected.sample_count(),
            skipped = collected.skipped.len(),
            "Metrics aggregated"
        );

        collected
    }
}

/// List the entity's metrics and query each recognized one
async fn fetch_entity(
    adapter: &RegionAdapter,
    fetch: &Fetch,
    window: &CycleWindow,
    consolidation: Consolidation,
) -> (FieldValues, Vec<SkippedField>) {
    let entity = fetch.dimension.value();
    let mut values = FieldValues::new();
    let mut skipped = Vec::new();

    let descriptors = match adapter.metrics(&fetch.dimension).await {
        Ok(descriptors) => descriptors,
        Err(e) => {
            skipped.push(SkippedField::new(entity, None, SkipReason::from(&e)));
            return (values, skipped);
        }
    };

    for descriptor in descriptors {
        let Some(field) = fetch.source.field_for(&descriptor.name) else {
            continue;
        };
        if values.contains_key(&field) {
            continue;
        }

        let query = MetricQuery {
            metric: descriptor,
            start: window.start,
            end: window.end,
            period_secs: window.period_secs,
            consolidation,
        };

        match adapter.query(&query).await {
            Ok(points) => {
                // Empty results are not an error, just absent
                if let Some(point) = latest(&points) {
                    values.insert(field, point.value);
                }
            }
            Err(e) => {
                skipped.push(SkippedField::new(
                    entity,
                    Some(&query.metric.name),
                    SkipReason::from(&e),
                ));
            }
        }
    }

    (values, skipped)
}

fn latest(points: &[Datapoint]) -> Option<&Datapoint> {
    points.iter().max_by_key(|p| p.timestamp)
}
