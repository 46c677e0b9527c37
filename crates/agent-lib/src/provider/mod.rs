//! Cloud provider client abstraction
//!
//! The agent never speaks a wire protocol itself. It consumes the provider
//! through two traits:
//! - [`CloudProvider`] lists regions and opens region-scoped clients
//! - [`RegionClient`] lists zones, VPCs, subnets, instances, volumes and
//!   metrics for one region, one page at a time
//!
//! [`RegionAdapter`] sits on top of a region client, walks pages and routes
//! every call through the [`QueryExecutor`](crate::query::QueryExecutor).

mod adapter;
mod fixture;
mod types;

pub use adapter::RegionAdapter;
pub use fixture::{FixtureMetric, FixtureProvider, FixtureRegion, ProviderFixture};
pub use types::*;

use crate::error::ProviderError;
use crate::models::AccountCredentials;
use async_trait::async_trait;
use std::sync::Arc;

/// Account-level provider entry point
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// List the regions visible to the account
    async fn list_regions(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Vec<RawRegion>, ProviderError>;

    /// Open a client scoped to one region
    async fn connect(
        &self,
        credentials: &AccountCredentials,
        region: &RawRegion,
    ) -> Result<Arc<dyn RegionClient>, ProviderError>;
}

/// Region-scoped listing and metric calls
#[async_trait]
pub trait RegionClient: Send + Sync {
    fn region(&self) -> &str;

    async fn list_zones(&self) -> Result<Vec<RawZone>, ProviderError>;

    async fn list_vpcs(&self, token: Option<&str>) -> Result<Page<RawVpc>, ProviderError>;

    async fn list_subnets(&self, token: Option<&str>) -> Result<Page<RawSubnet>, ProviderError>;

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        token: Option<&str>,
    ) -> Result<Page<RawReservation>, ProviderError>;

    async fn list_volumes(&self, token: Option<&str>) -> Result<Page<RawVolume>, ProviderError>;

    async fn list_metrics(
        &self,
        dimension: &MetricDimension,
        token: Option<&str>,
    ) -> Result<Page<MetricDescriptor>, ProviderError>;

    async fn query_metric(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, ProviderError>;
}
