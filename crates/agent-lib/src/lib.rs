//! Agent library for EC2 inventory discovery and metrics collection
//!
//! This crate provides the core functionality for:
//! - Provider access with throttling-aware retries
//! - Inventory discovery into a per-region relationship graph
//! - Fan-out metrics aggregation (volume, instance, instance type, account)
//! - Fixed-retention time-series storage
//! - Account registration, health checks and observability

pub mod accounts;
pub mod collector;
pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod provider;
pub mod query;
pub mod store;

#[cfg(test)]
mod testing;

pub use accounts::{Account, AccountRegistry, NewAccount};
pub use error::{AccountError, DiscoveryError, ProviderError, QueryError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, DiscoveryOutcome, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use query::{BackoffPolicy, QueryExecutor};
