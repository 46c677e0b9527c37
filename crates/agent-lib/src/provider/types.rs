//! Raw records as returned by the provider listing and metric APIs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tag map attached to most provider resources
pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRegion {
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawZone {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVpc {
    pub id: String,
    pub cidr_block: String,
    pub state: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSubnet {
    pub id: String,
    pub vpc_id: String,
    pub availability_zone: String,
    pub cidr_block: String,
    pub available_ip_address_count: u32,
    /// String-encoded boolean, "true" / "false"
    #[serde(default)]
    pub default_for_az: String,
    /// String-encoded boolean, "true" / "false"
    #[serde(default)]
    pub map_public_ip_on_launch: String,
    pub state: String,
    #[serde(default)]
    pub tags: Tags,
}

/// Instances are listed grouped by the reservation that launched them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReservation {
    #[serde(default)]
    pub id: String,
    pub instances: Vec<RawInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInstance {
    pub id: String,
    #[serde(default)]
    pub public_dns_name: String,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    pub image_id: String,
    pub instance_type: String,
    pub launch_time: DateTime<Utc>,
    pub state: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub monitored: bool,
    /// Availability zone name
    #[serde(default)]
    pub placement: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub instance_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVolume {
    pub id: String,
    pub volume_type: String,
    pub create_time: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
    #[serde(default)]
    pub iops: Option<u32>,
    pub status: String,
    pub zone: String,
    #[serde(default)]
    pub attachment: Option<RawAttachment>,
    #[serde(default)]
    pub tags: Tags,
}

/// Lifecycle states the instance listing can be filtered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
}

impl InstanceState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "shutting-down" => Some(Self::ShuttingDown),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        }
    }
}

/// `instance-state-name` filter for instance listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFilter {
    pub states: Vec<InstanceState>,
}

impl InstanceFilter {
    /// Every state except terminated
    pub fn active() -> Self {
        Self {
            states: vec![
                InstanceState::Pending,
                InstanceState::Running,
                InstanceState::ShuttingDown,
                InstanceState::Stopping,
                InstanceState::Stopped,
            ],
        }
    }

    /// Unknown state strings never match
    pub fn matches(&self, state: &str) -> bool {
        InstanceState::parse(state)
            .map(|s| self.states.contains(&s))
            .unwrap_or(false)
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Dimension a metric is reported under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricDimension {
    InstanceId(String),
    VolumeId(String),
}

impl MetricDimension {
    pub fn value(&self) -> &str {
        match self {
            Self::InstanceId(v) | Self::VolumeId(v) => v,
        }
    }

    /// Provider namespace the dimension is published in
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::InstanceId(_) => "AWS/EC2",
            Self::VolumeId(_) => "AWS/EBS",
        }
    }
}

impl fmt::Display for MetricDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstanceId(v) => write!(f, "InstanceId={}", v),
            Self::VolumeId(v) => write!(f, "VolumeId={}", v),
        }
    }
}

/// A metric the provider reports for a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    pub namespace: String,
    pub dimension: MetricDimension,
}

/// Consolidation function applied by the provider over a query period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consolidation {
    #[default]
    Average,
    Minimum,
    Maximum,
    Sum,
}

impl Consolidation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "Average",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
            Self::Sum => "Sum",
        }
    }

    /// Reduce a set of values with this function
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Sum => values.iter().sum(),
        })
    }
}

/// Windowed metric query
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub metric: MetricDescriptor,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
    pub consolidation: Consolidation,
}

/// One consolidated sample returned by a metric query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}
