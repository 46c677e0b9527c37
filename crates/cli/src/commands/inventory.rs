//! Inventory inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DiscoveryReport};
use crate::output::{color_status, or_dash, print_json, print_rows, print_warning, OutputFormat};

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Instance")]
    instance_id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Type")]
    instance_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Volumes")]
    volumes: String,
}

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Volume")]
    volume_id: String,
    #[tabled(rename = "Type")]
    volume_type: String,
    #[tabled(rename = "Size (GiB)")]
    size_gib: u64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Instance")]
    instance: String,
}

/// Show the latest discovered inventory of an account
pub async fn show_inventory(
    client: &ApiClient,
    account: &str,
    show_volumes: bool,
    format: OutputFormat,
) -> Result<()> {
    let report: DiscoveryReport = client
        .get(&["api", "v1", "accounts", account, "inventory"])
        .await?;

    if let OutputFormat::Json = format {
        return print_json(&report);
    }

    println!("{}", format!("Inventory: {}", report.account).bold());
    println!("Discovered at: {}", report.discovered_at);
    println!("Regions: {}", report.graph.regions.len());
    for failure in &report.failed_regions {
        print_warning(&format!("{}: {}", failure.region, failure.error));
    }
    println!();

    let mut instances = Vec::new();
    let mut volumes = Vec::new();
    for inventory in report.graph.regions.values() {
        for instance in inventory.instances.values() {
            let attached = inventory
                .volumes
                .values()
                .filter(|v| v.instance.as_deref() == Some(instance.id.as_str()))
                .count();
            instances.push(InstanceRow {
                region: inventory.region.title.clone(),
                instance_id: instance.instance_id.clone(),
                title: instance.title.clone(),
                instance_type: instance.instance_type.clone(),
                state: color_status(&instance.state),
                zone: or_dash(instance.zone.as_deref()),
                volumes: attached.to_string(),
            });
        }
        for volume in inventory.volumes.values() {
            volumes.push(VolumeRow {
                region: inventory.region.title.clone(),
                volume_id: volume.volume_id.clone(),
                volume_type: volume.volume_type.clone(),
                size_gib: volume.size_gib,
                status: color_status(&volume.status),
                instance: or_dash(volume.instance.as_deref()),
            });
        }
    }

    if instances.is_empty() {
        print_warning("No instances discovered");
    } else {
        let count = instances.len();
        print_rows(instances);
        println!("\nTotal: {} instances", count);
    }

    if show_volumes {
        println!();
        if volumes.is_empty() {
            print_warning("No volumes discovered");
        } else {
            let count = volumes.len();
            print_rows(volumes);
            println!("\nTotal: {} volumes", count);
        }
    }

    Ok(())
}
