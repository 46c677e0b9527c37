//! Metrics collection pipeline
//!
//! Per polling interval:
//! - instance and attached-volume metrics are queried through the query executor
//! - volume metrics roll up into their instance, instances into their
//!   instance type and the account
//! - results are written to the time-series store

mod aggregator;
mod fields;
mod r#loop;


pub use aggregator::{
    CollectedMetrics, CycleWindow, FieldValues, MetricsAggregator, SkipReason, SkippedField,
    DEFAULT_CLOCK_SKEW_SECS, DEFAULT_LOOKBACK_SECS, DEFAULT_QUERY_CONCURRENCY,
};
pub use fields::{series_names, MetricField};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleOutcome};
