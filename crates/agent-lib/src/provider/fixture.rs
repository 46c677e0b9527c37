//! In-memory provider backed by a captured account snapshot
//!
//! The snapshot is plain JSON, so the daemon can run against a recorded
//! account and tests can script throttling and failures per call.
//!
//! Call labels used for scripting:
//! - `regions`
//! - `zones:<region>`, `vpcs:<region>`, `subnets:<region>`,
//!   `instances:<region>`, `volumes:<region>`
//! - `list_metrics:<dimension value>`
//! - `query:<dimension value>:<metric name>`

use super::{
    CloudProvider, Datapoint, InstanceFilter, MetricDescriptor, MetricDimension, MetricQuery, Page,
    RawRegion, RawReservation, RawSubnet, RawVolume, RawVpc, RawZone, RegionClient,
};
use crate::error::ProviderError;
use crate::models::AccountCredentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

fn default_page_size() -> usize {
    100
}

/// Snapshot of one region
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureRegion {
    pub name: String,
    #[serde(default)]
    pub zones: Vec<RawZone>,
    #[serde(default)]
    pub vpcs: Vec<RawVpc>,
    #[serde(default)]
    pub subnets: Vec<RawSubnet>,
    #[serde(default)]
    pub reservations: Vec<RawReservation>,
    #[serde(default)]
    pub volumes: Vec<RawVolume>,
    /// Metrics keyed by dimension value (instance id, volume id, instance type)
    #[serde(default)]
    pub metrics: HashMap<String, Vec<FixtureMetric>>,
}

/// A metric series recorded for one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureMetric {
    pub name: String,
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
}

/// Serializable account snapshot plus scripted misbehaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderFixture {
    #[serde(default)]
    pub regions: Vec<FixtureRegion>,
    /// Rejects other access keys with an auth error when set
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Number of times each labelled call is throttled before it succeeds
    #[serde(default)]
    pub throttle: HashMap<String, u32>,
    /// Labelled calls that always fail with a request error
    #[serde(default)]
    pub fail: HashSet<String>,
}

struct Script {
    throttle: Mutex<HashMap<String, u32>>,
    fail: HashSet<String>,
}

impl Script {
    fn check(&self, label: &str) -> Result<(), ProviderError> {
        if self.fail.contains(label) {
            return Err(ProviderError::Request(format!("{} failed", label)));
        }

        let mut throttle = self.throttle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(remaining) = throttle.get_mut(label) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::Throttling(format!("Throttling: {}", label)));
            }
        }
        Ok(())
    }
}

/// [`CloudProvider`] over a [`ProviderFixture`]
pub struct FixtureProvider {
    regions: Vec<Arc<FixtureRegion>>,
    access_key: Option<String>,
    page_size: usize,
    script: Arc<Script>,
}

impl FixtureProvider {
    pub fn new(fixture: ProviderFixture) -> Self {
        Self {
            regions: fixture.regions.into_iter().map(Arc::new).collect(),
            access_key: fixture.access_key,
            page_size: fixture.page_size.max(1),
            script: Arc::new(Script {
                throttle: Mutex::new(fixture.throttle),
                fail: fixture.fail,
            }),
        }
    }

    /// Load a snapshot from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read provider fixture {:?}", path))?;
        let fixture: ProviderFixture = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse provider fixture {:?}", path))?;
        Ok(Self::new(fixture))
    }

    fn authorize(&self, credentials: &AccountCredentials) -> Result<(), ProviderError> {
        match &self.access_key {
            Some(expected) if expected != &credentials.access_key => Err(ProviderError::Auth(
                format!("access key {} is not valid", credentials.access_key),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CloudProvider for FixtureProvider {
    async fn list_regions(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Vec<RawRegion>, ProviderError> {
        self.authorize(credentials)?;
        self.script.check("regions")?;

        Ok(self
            .regions
            .iter()
            .map(|r| RawRegion {
                name: r.name.clone(),
                endpoint: None,
            })
            .collect())
    }

    async fn connect(
        &self,
        credentials: &AccountCredentials,
        region: &RawRegion,
    ) -> Result<Arc<dyn RegionClient>, ProviderError> {
        self.authorize(credentials)?;
        self.script.check(&format!("connect:{}", region.name))?;

        let data = self
            .regions
            .iter()
            .find(|r| r.name == region.name)
            .cloned()
            .ok_or_else(|| ProviderError::Request(format!("unknown region {}", region.name)))?;

        Ok(Arc::new(FixtureRegionClient {
            data,
            page_size: self.page_size,
            script: self.script.clone(),
        }))
    }
}

struct FixtureRegionClient {
    data: Arc<FixtureRegion>,
    page_size: usize,
    script: Arc<Script>,
}

impl FixtureRegionClient {
    fn label(&self, call: &str) -> String {
        format!("{}:{}", call, self.data.name)
    }

    /// Offset-based pages; the token is the offset of the next page
    fn page<T: Clone>(&self, items: &[T], token: Option<&str>) -> Result<Page<T>, ProviderError> {
        let offset = match token {
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| ProviderError::Request(format!("invalid page token {}", t)))?,
            None => 0,
        };

        let end = (offset + self.page_size).min(items.len());
        let slice = items.get(offset..end).unwrap_or_default().to_vec();
        let next_token = (end < items.len()).then(|| end.to_string());

        Ok(Page {
            items: slice,
            next_token,
        })
    }
}

#[async_trait]
impl RegionClient for FixtureRegionClient {
    fn region(&self) -> &str {
        &self.data.name
    }

    async fn list_zones(&self) -> Result<Vec<RawZone>, ProviderError> {
        self.script.check(&self.label("zones"))?;
        Ok(self.data.zones.clone())
    }

    async fn list_vpcs(&self, token: Option<&str>) -> Result<Page<RawVpc>, ProviderError> {
        self.script.check(&self.label("vpcs"))?;
        self.page(&self.data.vpcs, token)
    }

    async fn list_subnets(&self, token: Option<&str>) -> Result<Page<RawSubnet>, ProviderError> {
        self.script.check(&self.label("subnets"))?;
        self.page(&self.data.subnets, token)
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        token: Option<&str>,
    ) -> Result<Page<RawReservation>, ProviderError> {
        self.script.check(&self.label("instances"))?;

        let reservations: Vec<RawReservation> = self
            .data
            .reservations
            .iter()
            .map(|r| RawReservation {
                id: r.id.clone(),
                instances: r
                    .instances
                    .iter()
                    .filter(|i| filter.matches(&i.state))
                    .cloned()
                    .collect(),
            })
            .filter(|r| !r.instances.is_empty())
            .collect();

        self.page(&reservations, token)
    }

    async fn list_volumes(&self, token: Option<&str>) -> Result<Page<RawVolume>, ProviderError> {
        self.script.check(&self.label("volumes"))?;
        self.page(&self.data.volumes, token)
    }

    async fn list_metrics(
        &self,
        dimension: &MetricDimension,
        token: Option<&str>,
    ) -> Result<Page<MetricDescriptor>, ProviderError> {
        self.script
            .check(&format!("list_metrics:{}", dimension.value()))?;

        let descriptors: Vec<MetricDescriptor> = self
            .data
            .metrics
            .get(dimension.value())
            .map(|metrics| {
                metrics
                    .iter()
                    .map(|m| MetricDescriptor {
                        name: m.name.clone(),
                        namespace: dimension.namespace().to_string(),
                        dimension: dimension.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.page(&descriptors, token)
    }

    async fn query_metric(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, ProviderError> {
        let dimension = query.metric.dimension.value();
        self.script
            .check(&format!("query:{}:{}", dimension, query.metric.name))?;

        let mut points: Vec<Datapoint> = self
            .data
            .metrics
            .get(dimension)
            .and_then(|metrics| metrics.iter().find(|m| m.name == query.metric.name))
            .map(|m| {
                m.datapoints
                    .iter()
                    .filter(|p| p.timestamp >= query.start && p.timestamp <= query.end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn vpc(id: &str) -> RawVpc {
        RawVpc {
            id: id.to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
            state: "available".to_string(),
            tags: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_pagination_tokens() {
        let provider = FixtureProvider::new(ProviderFixture {
            regions: vec![FixtureRegion {
                name: "us-east-1".to_string(),
                vpcs: vec![vpc("vpc-1"), vpc("vpc-2"), vpc("vpc-3")],
                ..Default::default()
            }],
            page_size: 2,
            ..Default::default()
        });

        let creds = AccountCredentials::new("ak", "sk");
        let regions = provider.list_regions(&creds).await.unwrap();
        let client = provider.connect(&creds, &regions[0]).await.unwrap();

        let first = client.list_vpcs(None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = client.list_vpcs(first.next_token.as_deref()).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_scripted_throttling_runs_out() {
        let provider = FixtureProvider::new(ProviderFixture {
            regions: vec![FixtureRegion {
                name: "us-east-1".to_string(),
                ..Default::default()
            }],
            throttle: HashMap::from([("regions".to_string(), 1)]),
            page_size: 100,
            ..Default::default()
        });

        let creds = AccountCredentials::new("ak", "sk");
        let err = provider.list_regions(&creds).await.unwrap_err();
        assert!(err.is_throttling());
        assert!(provider.list_regions(&creds).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_access_key_is_auth_error() {
        let provider = FixtureProvider::new(ProviderFixture {
            access_key: Some("good".to_string()),
            page_size: 100,
            ..Default::default()
        });

        let err = provider
            .list_regions(&AccountCredentials::new("bad", "sk"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn test_query_filters_window() {
        let now = Utc::now();
        let mut metrics = HashMap::new();
        metrics.insert(
            "i-1".to_string(),
            vec![FixtureMetric {
                name: "CPUUtilization".to_string(),
                datapoints: vec![
                    Datapoint {
                        timestamp: now - chrono::Duration::seconds(1000),
                        value: 1.0,
                    },
                    Datapoint {
                        timestamp: now - chrono::Duration::seconds(60),
                        value: 2.0,
                    },
                ],
            }],
        );

        let provider = FixtureProvider::new(ProviderFixture {
            regions: vec![FixtureRegion {
                name: "us-east-1".to_string(),
                metrics,
                ..Default::default()
            }],
            page_size: 100,
            ..Default::default()
        });

        let creds = AccountCredentials::new("ak", "sk");
        let regions = provider.list_regions(&creds).await.unwrap();
        let client = provider.connect(&creds, &regions[0]).await.unwrap();

        let dimension = MetricDimension::InstanceId("i-1".to_string());
        let descriptors = client.list_metrics(&dimension, None).await.unwrap();
        assert_eq!(descriptors.items.len(), 1);

        let points = client
            .query_metric(&MetricQuery {
                metric: descriptors.items[0].clone(),
                start: now - chrono::Duration::seconds(305),
                end: now,
                period_secs: 300,
                consolidation: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2.0);
    }
}
