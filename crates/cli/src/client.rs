//! API client for communicating with the agent's management API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// URL of an API endpoint; each segment is percent-encoded on its own,
    /// so names containing `/` or `?` stay a single segment
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.get_with_query(segments, &[]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, i64)],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        Self::send(self.client.get(url).query(query)).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, segments: &[&str], body: &B) -> Result<T> {
        let url = self.endpoint(segments)?;
        Self::send(self.client.post(url).json(body)).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, segments: &[&str], body: &B) -> Result<T> {
        let url = self.endpoint(segments)?;
        Self::send(self.client.put(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub id: String,
    pub access_key: String,
    pub collector: String,
    pub linux_device_class: Option<String>,
    pub windows_device_class: Option<String>,
    pub registered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceClasses {
    pub linux_device_class: Option<String>,
    pub windows_device_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub account: String,
    pub graph: InventoryGraph,
    pub failed_regions: Vec<RegionFailure>,
    pub discover_guests: bool,
    pub discovered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryGraph {
    pub regions: BTreeMap<String, RegionInventory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInventory {
    pub region: Region,
    #[serde(default)]
    pub zones: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub vpcs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub subnets: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,
    #[serde(default)]
    pub volumes: BTreeMap<String, Volume>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub title: String,
    pub instance_id: String,
    pub instance_type: String,
    pub state: String,
    pub platform: String,
    pub zone: Option<String>,
    pub subnet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub title: String,
    pub volume_id: String,
    pub volume_type: String,
    pub size_gib: u64,
    pub status: String,
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionFailure {
    pub region: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesEntity {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub entity: SeriesEntity,
    pub field: String,
    pub start: i64,
    pub end: i64,
    pub samples: Vec<Sample>,
}
