//! Core data models for the inventory graph
//!
//! Every entity is keyed by a normalized [`EntityId`] and lives inside the
//! [`RegionInventory`] of the region it was discovered in. Reference fields
//! are scoped to that region, so a reference can never point into another
//! region's inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalized identifier for a discovered entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Normalize a provider-native id: lowercase, every character outside
    /// `[a-z0-9]` replaced with `_`
    pub fn normalize(raw: &str) -> Self {
        let id: String = raw
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if id.is_empty() {
            Self("_".to_string())
        } else {
            Self(id)
        }
    }

    /// `<region>.<id>`; normalized ids never contain `.`
    pub fn in_region(region: &EntityId, id: &EntityId) -> Self {
        Self(format!("{}.{}", region.0, id.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access key pair for one account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl AccountCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Region entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: EntityId,
    pub title: String,
}

/// Availability zone entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: EntityId,
    pub title: String,
    pub state: String,
}

/// VPC entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: EntityId,
    pub title: String,
    pub cidr_block: String,
    pub state: String,
    /// Collector assigned through the `Collector` tag
    pub collector: Option<EntityId>,
}

/// VPC subnet entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: EntityId,
    pub title: String,
    pub available_ip_address_count: u32,
    pub cidr_block: String,
    pub default_for_az: Option<bool>,
    pub map_public_ip_on_launch: Option<bool>,
    pub state: String,
    pub vpc: Option<EntityId>,
    pub zone: Option<EntityId>,
}

/// Compute instance entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: EntityId,
    pub title: String,
    /// Raw provider instance id, used for metric dimensions
    pub instance_id: String,
    pub public_dns_name: String,
    pub private_ip_address: Option<String>,
    pub image_id: String,
    pub instance_type: String,
    pub launch_time: DateTime<Utc>,
    pub state: String,
    pub platform: String,
    pub detailed_monitoring: bool,
    pub zone: Option<EntityId>,
    /// Absent for instances launched outside a VPC
    pub subnet: Option<EntityId>,
}

/// Block storage volume entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: EntityId,
    pub title: String,
    /// Raw provider volume id, used for metric dimensions
    pub volume_id: String,
    pub volume_type: String,
    pub create_time: DateTime<Utc>,
    /// Size in GiB
    pub size_gib: u64,
    pub iops: Option<u32>,
    pub status: String,
    pub attach_data_status: Option<String>,
    pub attach_data_devicepath: Option<String>,
    pub instance: Option<EntityId>,
    pub zone: Option<EntityId>,
}

impl Volume {
    /// Attached volumes with a resolved owner take part in instance rollups
    pub fn attached_instance(&self) -> Option<&EntityId> {
        match self.attach_data_status.as_deref() {
            Some("attached") => self.instance.as_ref(),
            _ => None,
        }
    }
}

/// Everything discovered inside a single region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInventory {
    pub region: Region,
    pub zones: BTreeMap<EntityId, Zone>,
    pub vpcs: BTreeMap<EntityId, Vpc>,
    pub subnets: BTreeMap<EntityId, Subnet>,
    pub instances: BTreeMap<EntityId, Instance>,
    pub volumes: BTreeMap<EntityId, Volume>,
}

impl RegionInventory {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            zones: BTreeMap::new(),
            vpcs: BTreeMap::new(),
            subnets: BTreeMap::new(),
            instances: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }

    /// Volumes attached to the given instance
    pub fn volumes_attached_to<'a>(
        &'a self,
        instance: &EntityId,
    ) -> impl Iterator<Item = &'a Volume> + 'a {
        let instance = instance.clone();
        self.volumes
            .values()
            .filter(move |v| v.attached_instance() == Some(&instance))
    }
}

/// Relationship graph for one account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryGraph {
    pub regions: BTreeMap<EntityId, RegionInventory>,
}

impl InventoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_region(&mut self, inventory: RegionInventory) {
        self.regions.insert(inventory.region.id.clone(), inventory);
    }

    /// Regenerate-and-merge: regions present in `other` replace ours, the
    /// rest are kept as they were
    pub fn merge(&mut self, other: InventoryGraph) {
        self.regions.extend(other.regions);
    }

    /// Iterate instances across all regions along with their region
    pub fn instances(&self) -> impl Iterator<Item = (&RegionInventory, &Instance)> {
        self.regions
            .values()
            .flat_map(|r| r.instances.values().map(move |i| (r, i)))
    }

    pub fn instance_count(&self) -> usize {
        self.regions.values().map(|r| r.instances.len()).sum()
    }

    pub fn volume_count(&self) -> usize {
        self.regions.values().map(|r| r.volumes.len()).sum()
    }
}

/// A region whose discovery failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFailure {
    pub region: String,
    pub error: String,
}

/// Output of one discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub account: String,
    pub graph: InventoryGraph,
    pub failed_regions: Vec<RegionFailure>,
    /// Signals the guest-device collaborator to rebuild its mapping
    pub discover_guests: bool,
    pub discovered_at: DateTime<Utc>,
}
