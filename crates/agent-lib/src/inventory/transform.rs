//! Raw provider listings to graph entities
//!
//! References are resolved against the entities already built for the same
//! region. Anything that does not resolve is left unset.

use crate::models::{
    EntityId, Instance, Region, RegionInventory, Subnet, Volume, Vpc, Zone,
};
use crate::provider::{
    InstanceFilter, RawRegion, RawReservation, RawSubnet, RawVolume, RawVpc, RawZone, Tags,
};
use std::collections::BTreeMap;
use tracing::debug;

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Everything listed for one region, before transformation
#[derive(Debug, Clone, Default)]
pub struct RegionListing {
    pub zones: Vec<RawZone>,
    pub vpcs: Vec<RawVpc>,
    pub subnets: Vec<RawSubnet>,
    pub reservations: Vec<RawReservation>,
    pub volumes: Vec<RawVolume>,
}

/// Value of the `Name` tag, or `default`
pub fn name_or(tags: &Tags, default: &str) -> String {
    tags.get("Name").cloned().unwrap_or_else(|| default.to_string())
}

/// Provider string booleans; anything but true/false is unknown
pub fn to_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub fn size_to_gib(bytes: u64) -> u64 {
    bytes / BYTES_PER_GIB
}

/// Keep `id` only when it names an entity of the same region
fn resolve<V>(
    entities: &BTreeMap<EntityId, V>,
    raw: Option<&str>,
    kind: &str,
    region: &EntityId,
) -> Option<EntityId> {
    let raw = raw.filter(|r| !r.is_empty())?;
    let id = EntityId::normalize(raw);
    if entities.contains_key(&id) {
        Some(id)
    } else {
        debug!(region = %region, kind = %kind, reference = %raw, "Dropping unresolved reference");
        None
    }
}

/// Build the inventory of one region from its listings
pub fn region_inventory(
    region: &RawRegion,
    listing: RegionListing,
    filter: &InstanceFilter,
) -> RegionInventory {
    let mut inventory = RegionInventory::new(Region {
        id: EntityId::normalize(&region.name),
        title: region.name.clone(),
    });
    let region_id = inventory.region.id.clone();

    for zone in listing.zones {
        let id = EntityId::normalize(&zone.name);
        inventory.zones.insert(
            id.clone(),
            Zone {
                id,
                title: zone.name,
                state: zone.state,
            },
        );
    }

    for vpc in listing.vpcs {
        let id = EntityId::normalize(&vpc.id);
        inventory.vpcs.insert(
            id.clone(),
            Vpc {
                id,
                title: name_or(&vpc.tags, &vpc.id),
                cidr_block: vpc.cidr_block,
                state: vpc.state,
                collector: vpc.tags.get("Collector").map(|c| EntityId::normalize(c)),
            },
        );
    }

    for subnet in listing.subnets {
        let id = EntityId::normalize(&subnet.id);
        let vpc = resolve(&inventory.vpcs, Some(&subnet.vpc_id), "vpc", &region_id);
        let zone = resolve(
            &inventory.zones,
            Some(&subnet.availability_zone),
            "zone",
            &region_id,
        );
        inventory.subnets.insert(
            id.clone(),
            Subnet {
                id,
                title: name_or(&subnet.tags, &subnet.id),
                available_ip_address_count: subnet.available_ip_address_count,
                cidr_block: subnet.cidr_block,
                default_for_az: to_boolean(&subnet.default_for_az),
                map_public_ip_on_launch: to_boolean(&subnet.map_public_ip_on_launch),
                state: subnet.state,
                vpc,
                zone,
            },
        );
    }

    // Providers are not trusted to honour the state filter
    let instances = listing
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .filter(|i| !i.id.is_empty() && filter.matches(&i.state));

    for instance in instances {
        let id = EntityId::normalize(&instance.id);
        let zone = resolve(
            &inventory.zones,
            instance.placement.as_deref(),
            "zone",
            &region_id,
        );
        let subnet = resolve(
            &inventory.subnets,
            instance.subnet_id.as_deref(),
            "subnet",
            &region_id,
        );
        inventory.instances.insert(
            id.clone(),
            Instance {
                id,
                title: name_or(&instance.tags, &instance.id),
                instance_id: instance.id,
                public_dns_name: instance.public_dns_name,
                private_ip_address: instance.private_ip_address,
                image_id: instance.image_id,
                instance_type: instance.instance_type,
                launch_time: instance.launch_time,
                state: instance.state,
                platform: instance.platform.unwrap_or_default(),
                detailed_monitoring: instance.monitored,
                zone,
                subnet,
            },
        );
    }

    for volume in listing.volumes {
        let id = EntityId::normalize(&volume.id);
        let attachment = volume.attachment.as_ref();
        let instance = resolve(
            &inventory.instances,
            attachment.and_then(|a| a.instance_id.as_deref()),
            "instance",
            &region_id,
        );
        let zone = resolve(&inventory.zones, Some(&volume.zone), "zone", &region_id);
        inventory.volumes.insert(
            id.clone(),
            Volume {
                id,
                title: name_or(&volume.tags, &volume.id),
                volume_id: volume.id.clone(),
                volume_type: volume.volume_type,
                create_time: volume.create_time,
                size_gib: size_to_gib(volume.size),
                iops: volume.iops,
                status: volume.status,
                attach_data_status: attachment.map(|a| a.status.clone()),
                attach_data_devicepath: attachment.and_then(|a| a.device.clone()),
                instance,
                zone,
            },
        );
    }

    inventory
}
