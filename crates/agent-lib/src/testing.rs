//! Shared provider snapshot for unit tests
//!
//! Two regions:
//! - `us-east-1`: web-1 (`i-1`, two attached volumes), a stopped and a
//!   terminated instance, `i-4` of a second type, one unattached volume
//! - `us-west-2`: `i-9` pointing at zone/subnet ids that only exist in
//!   `us-east-1`, and `subnet_abc` colliding with `subnet-ABC` after
//!   normalization

use crate::models::AccountCredentials;
use crate::provider::{
    Datapoint, FixtureMetric, FixtureProvider, FixtureRegion, ProviderFixture, RawAttachment,
    RawInstance, RawReservation, RawSubnet, RawVolume, RawVpc, RawZone, Tags,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) fn window_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap()
}

pub(crate) fn credentials() -> AccountCredentials {
    AccountCredentials::new("AKIDEXAMPLE", "secret")
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn zone(name: &str) -> RawZone {
    RawZone {
        name: name.to_string(),
        state: "available".to_string(),
    }
}

fn subnet(id: &str, vpc: &str, zone: &str) -> RawSubnet {
    RawSubnet {
        id: id.to_string(),
        vpc_id: vpc.to_string(),
        availability_zone: zone.to_string(),
        cidr_block: "10.0.1.0/24".to_string(),
        available_ip_address_count: 250,
        default_for_az: "true".to_string(),
        map_public_ip_on_launch: "False".to_string(),
        state: "available".to_string(),
        tags: Tags::new(),
    }
}

pub(crate) fn instance(
    id: &str,
    state: &str,
    instance_type: &str,
    placement: Option<&str>,
    subnet: Option<&str>,
) -> RawInstance {
    RawInstance {
        id: id.to_string(),
        public_dns_name: format!("{}.compute.example.com", id),
        private_ip_address: Some("10.0.1.10".to_string()),
        image_id: "ami-12345".to_string(),
        instance_type: instance_type.to_string(),
        launch_time: Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap(),
        state: state.to_string(),
        platform: None,
        monitored: false,
        placement: placement.map(str::to_string),
        subnet_id: subnet.map(str::to_string),
        tags: Tags::new(),
    }
}

pub(crate) fn volume(id: &str, attached_to: Option<&str>) -> RawVolume {
    RawVolume {
        id: id.to_string(),
        volume_type: "gp2".to_string(),
        create_time: Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap(),
        size: 107_374_182_400,
        iops: Some(300),
        status: if attached_to.is_some() { "in-use" } else { "available" }.to_string(),
        zone: "us-east-1a".to_string(),
        attachment: attached_to.map(|instance| RawAttachment {
            instance_id: Some(instance.to_string()),
            status: "attached".to_string(),
            device: Some("/dev/sda1".to_string()),
        }),
        tags: Tags::new(),
    }
}

/// One metric with a single sample `secs_before_end` before the window end
pub(crate) fn metric(name: &str, secs_before_end: i64, value: f64) -> FixtureMetric {
    FixtureMetric {
        name: name.to_string(),
        datapoints: vec![Datapoint {
            timestamp: window_end() - Duration::seconds(secs_before_end),
            value,
        }],
    }
}

pub(crate) fn sample_fixture() -> ProviderFixture {
    let mut web = instance("i-1", "running", "m1.small", Some("us-east-1a"), Some("subnet-1"));
    web.tags = tags(&[("Name", "web-1")]);

    let mut east_metrics = HashMap::new();
    east_metrics.insert(
        "i-1".to_string(),
        vec![
            FixtureMetric {
                name: "CPUUtilization".to_string(),
                datapoints: vec![
                    Datapoint {
                        timestamp: window_end() - Duration::seconds(240),
                        value: 20.0,
                    },
                    Datapoint {
                        timestamp: window_end() - Duration::seconds(60),
                        value: 40.0,
                    },
                ],
            },
            metric("NetworkIn", 60, 1000.0),
            metric("NetworkOut", 60, 500.0),
            metric("DiskReadOps", 60, 3.0),
            // Not on the allowlist
            metric("StatusCheckFailed", 60, 1.0),
        ],
    );
    east_metrics.insert(
        "i-2".to_string(),
        // Outside the lookback window
        vec![metric("CPUUtilization", 3600, 99.0)],
    );
    east_metrics.insert(
        "i-4".to_string(),
        vec![
            metric("CPUUtilization", 60, 10.0),
            metric("NetworkIn", 60, 200.0),
        ],
    );
    east_metrics.insert(
        "vol-1".to_string(),
        vec![
            metric("VolumeReadOps", 60, 10.0),
            metric("VolumeWriteOps", 60, 4.0),
            metric("VolumeReadBytes", 60, 4096.0),
        ],
    );
    east_metrics.insert(
        "vol-2".to_string(),
        vec![
            metric("VolumeReadOps", 60, 15.0),
            metric("VolumeWriteOps", 60, 6.0),
        ],
    );
    east_metrics.insert("vol-3".to_string(), vec![metric("VolumeReadOps", 60, 100.0)]);
    east_metrics.insert("vol-4".to_string(), vec![metric("VolumeReadOps", 60, 7.0)]);

    let east = FixtureRegion {
        name: "us-east-1".to_string(),
        zones: vec![zone("us-east-1a"), zone("us-east-1b")],
        vpcs: vec![
            RawVpc {
                id: "vpc-1".to_string(),
                cidr_block: "10.0.0.0/16".to_string(),
                state: "available".to_string(),
                tags: tags(&[("Name", "prod"), ("Collector", "Collector-1")]),
            },
            RawVpc {
                id: "vpc-2".to_string(),
                cidr_block: "10.1.0.0/16".to_string(),
                state: "pending".to_string(),
                tags: Tags::new(),
            },
        ],
        subnets: vec![
            subnet("subnet-1", "vpc-1", "us-east-1a"),
            subnet("subnet-ABC", "vpc-1", "us-east-1b"),
        ],
        reservations: vec![
            RawReservation {
                id: "r-1".to_string(),
                instances: vec![
                    web,
                    instance("i-2", "stopped", "m1.small", Some("us-east-1b"), None),
                    instance("i-3", "terminated", "m1.small", Some("us-east-1a"), None),
                ],
            },
            RawReservation {
                id: "r-2".to_string(),
                instances: vec![instance(
                    "i-4",
                    "running",
                    "m1.large",
                    Some("us-east-1a"),
                    Some("subnet-1"),
                )],
            },
        ],
        volumes: vec![
            volume("vol-1", Some("i-1")),
            volume("vol-2", Some("i-1")),
            volume("vol-3", None),
            volume("vol-4", Some("i-4")),
        ],
        metrics: east_metrics,
    };

    let west = FixtureRegion {
        name: "us-west-2".to_string(),
        zones: vec![zone("us-west-2a")],
        vpcs: vec![RawVpc {
            id: "vpc-9".to_string(),
            cidr_block: "172.16.0.0/16".to_string(),
            state: "available".to_string(),
            tags: Tags::new(),
        }],
        subnets: vec![subnet("subnet_abc", "vpc-9", "us-west-2a")],
        reservations: vec![RawReservation {
            id: "r-9".to_string(),
            instances: vec![
                instance("i-9", "running", "t2.micro", Some("us-east-1a"), Some("subnet-1")),
                instance("i-10", "pending", "t2.micro", Some("us-west-2a"), Some("subnet_abc")),
            ],
        }],
        volumes: Vec::new(),
        metrics: HashMap::new(),
    };

    ProviderFixture {
        regions: vec![east, west],
        access_key: Some("AKIDEXAMPLE".to_string()),
        page_size: 100,
        throttle: HashMap::new(),
        fail: Default::default(),
    }
}

pub(crate) fn sample_provider() -> Arc<FixtureProvider> {
    Arc::new(FixtureProvider::new(sample_fixture()))
}
