//! Paginated, retried access to one region

use super::{
    Datapoint, InstanceFilter, MetricDescriptor, MetricDimension, MetricQuery, Page, RawReservation,
    RawSubnet, RawVolume, RawVpc, RawZone, RegionClient,
};
use crate::error::{ProviderError, QueryError};
use crate::query::QueryExecutor;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on pages walked for a single listing
const MAX_PAGES: usize = 10_000;

/// Region client wrapped with pagination and backoff
#[derive(Clone)]
pub struct RegionAdapter {
    client: Arc<dyn RegionClient>,
    executor: QueryExecutor,
}

impl RegionAdapter {
    pub fn new(client: Arc<dyn RegionClient>, executor: QueryExecutor) -> Self {
        Self { client, executor }
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    pub async fn zones(&self) -> Result<Vec<RawZone>, QueryError> {
        let client = &self.client;
        self.executor
            .execute("list_zones", || async move { client.list_zones().await })
            .await
    }

    pub async fn vpcs(&self) -> Result<Vec<RawVpc>, QueryError> {
        let client = &self.client;
        self.paginate("list_vpcs", |token| async move {
            client.list_vpcs(token.as_deref()).await
        })
        .await
    }

    pub async fn subnets(&self) -> Result<Vec<RawSubnet>, QueryError> {
        let client = &self.client;
        self.paginate("list_subnets", |token| async move {
            client.list_subnets(token.as_deref()).await
        })
        .await
    }

    pub async fn instances(&self, filter: &InstanceFilter) -> Result<Vec<RawReservation>, QueryError> {
        let client = &self.client;
        self.paginate("list_instances", |token| async move {
            client.list_instances(filter, token.as_deref()).await
        })
        .await
    }

    pub async fn volumes(&self) -> Result<Vec<RawVolume>, QueryError> {
        let client = &self.client;
        self.paginate("list_volumes", |token| async move {
            client.list_volumes(token.as_deref()).await
        })
        .await
    }

    pub async fn metrics(
        &self,
        dimension: &MetricDimension,
    ) -> Result<Vec<MetricDescriptor>, QueryError> {
        let client = &self.client;
        self.paginate("list_metrics", |token| async move {
            client.list_metrics(dimension, token.as_deref()).await
        })
        .await
    }

    pub async fn query(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, QueryError> {
        let client = &self.client;
        self.executor
            .execute("query_metric", || async move { client.query_metric(query).await })
            .await
    }

    /// Walk every page of a listing, retrying each page independently
    async fn paginate<T, F, Fut>(&self, operation: &str, mut fetch: F) -> Result<Vec<T>, QueryError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ProviderError>>,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        for page_number in 0..MAX_PAGES {
            let page = self
                .executor
                .execute(operation, || fetch(token.clone()))
                .await?;

            debug!(
                region = %self.region(),
                operation = %operation,
                page = page_number,
                items = page.items.len(),
                "Fetched listing page"
            );

            items.extend(page.items);

            match page.next_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                Some(_) => {
                    return Err(QueryError::Provider(ProviderError::Request(format!(
                        "{} returned a repeated page token",
                        operation
                    ))))
                }
                None => return Ok(items),
            }
        }

        Err(QueryError::Provider(ProviderError::Request(format!(
            "{} exceeded {} pages",
            operation, MAX_PAGES
        ))))
    }
}
