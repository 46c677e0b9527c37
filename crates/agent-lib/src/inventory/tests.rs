//! Discovery tests against the shared provider snapshot

use super::*;
use crate::error::DiscoveryError;
use crate::models::{AccountCredentials, EntityId};
use crate::provider::FixtureProvider;
use crate::query::QueryExecutor;
use crate::testing::{credentials, sample_fixture, sample_provider};
use std::sync::Arc;
use tempfile::TempDir;

fn id(raw: &str) -> EntityId {
    EntityId::normalize(raw)
}

fn builder(provider: Arc<FixtureProvider>) -> InventoryBuilder {
    InventoryBuilder::new(provider, QueryExecutor::default())
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let builder = builder(sample_provider());

    let first = builder.discover("prod", &credentials()).await.unwrap();
    let second = builder.discover("prod", &credentials()).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.graph).unwrap(),
        serde_json::to_string(&second.graph).unwrap()
    );
    assert!(first.discover_guests);
    assert!(first.failed_regions.is_empty());
}

#[tokio::test]
async fn test_pagination_does_not_change_graph() {
    let mut fixture = sample_fixture();
    fixture.page_size = 1;
    let paged = builder(Arc::new(FixtureProvider::new(fixture)))
        .discover("prod", &credentials())
        .await
        .unwrap();
    let whole = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();

    assert_eq!(paged.graph, whole.graph);
}

#[tokio::test]
async fn test_titles_and_attributes() {
    let report = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();
    let east = &report.graph.regions[&id("us-east-1")];

    assert_eq!(east.region.title, "us-east-1");
    assert_eq!(east.instances[&id("i-1")].title, "web-1");
    assert_eq!(east.instances[&id("i-2")].title, "i-2");

    let vpc = &east.vpcs[&id("vpc-1")];
    assert_eq!(vpc.title, "prod");
    assert_eq!(vpc.collector, Some(id("collector_1")));
    assert_eq!(east.vpcs[&id("vpc-2")].collector, None);

    let subnet = &east.subnets[&id("subnet-1")];
    assert_eq!(subnet.default_for_az, Some(true));
    assert_eq!(subnet.map_public_ip_on_launch, Some(false));
    assert_eq!(subnet.vpc, Some(id("vpc-1")));
    assert_eq!(subnet.zone, Some(id("us-east-1a")));
}

#[tokio::test]
async fn test_terminated_instances_are_excluded() {
    let report = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();
    let east = &report.graph.regions[&id("us-east-1")];

    assert!(east.instances.contains_key(&id("i-2")));
    assert!(!east.instances.contains_key(&id("i-3")));
    assert_eq!(report.graph.instance_count(), 5);
}

#[tokio::test]
async fn test_volume_attributes() {
    let report = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();
    let east = &report.graph.regions[&id("us-east-1")];

    let attached = &east.volumes[&id("vol-1")];
    assert_eq!(attached.size_gib, 100);
    assert_eq!(attached.instance, Some(id("i-1")));
    assert_eq!(attached.attach_data_devicepath.as_deref(), Some("/dev/sda1"));
    assert_eq!(attached.volume_id, "vol-1");

    let loose = &east.volumes[&id("vol-3")];
    assert_eq!(loose.instance, None);
    assert_eq!(loose.attach_data_status, None);

    let ids: Vec<_> = east
        .volumes_attached_to(&id("i-1"))
        .map(|v| v.volume_id.as_str())
        .collect();
    assert_eq!(ids, vec!["vol-1", "vol-2"]);
}

#[tokio::test]
async fn test_references_do_not_cross_regions() {
    let report = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();
    let east = &report.graph.regions[&id("us-east-1")];
    let west = &report.graph.regions[&id("us-west-2")];

    // i-9 names a zone and subnet that only exist in us-east-1
    let stray = &west.instances[&id("i-9")];
    assert_eq!(stray.zone, None);
    assert_eq!(stray.subnet, None);

    // subnet-ABC and subnet_abc collide once normalized
    assert_eq!(east.subnets[&id("subnet-ABC")].vpc, Some(id("vpc-1")));
    assert_eq!(west.subnets[&id("subnet_abc")].vpc, Some(id("vpc-9")));

    let local = &west.instances[&id("i-10")];
    assert_eq!(local.subnet, Some(id("subnet_abc")));
    assert_eq!(local.zone, Some(id("us-west-2a")));
}

#[tokio::test]
async fn test_failed_region_does_not_fail_account() {
    let mut fixture = sample_fixture();
    fixture.fail.insert("zones:us-west-2".to_string());

    let report = builder(Arc::new(FixtureProvider::new(fixture)))
        .discover("prod", &credentials())
        .await
        .unwrap();

    assert!(report.graph.regions.contains_key(&id("us-east-1")));
    assert!(!report.graph.regions.contains_key(&id("us-west-2")));
    assert_eq!(report.failed_regions.len(), 1);
    assert_eq!(report.failed_regions[0].region, "us-west-2");
}

#[tokio::test(start_paused = true)]
async fn test_throttled_listing_recovers() {
    let mut fixture = sample_fixture();
    fixture.throttle.insert("vpcs:us-east-1".to_string(), 2);

    let report = builder(Arc::new(FixtureProvider::new(fixture)))
        .discover("prod", &credentials())
        .await
        .unwrap();

    assert!(report.failed_regions.is_empty());
    assert_eq!(report.graph.regions[&id("us-east-1")].vpcs.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_permanently_throttled_listing_fails_region() {
    let mut fixture = sample_fixture();
    fixture.throttle.insert("volumes:us-west-2".to_string(), 10);

    let report = builder(Arc::new(FixtureProvider::new(fixture)))
        .discover("prod", &credentials())
        .await
        .unwrap();

    assert_eq!(report.failed_regions.len(), 1);
    assert!(report.failed_regions[0].error.contains("permanently throttled"));
    assert_eq!(report.graph.regions.len(), 1);
}

#[tokio::test]
async fn test_missing_credentials() {
    let builder = builder(sample_provider());

    let err = builder
        .discover("prod", &AccountCredentials::new("", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::MissingCredentials { key: "access key", .. }
    ));

    let err = builder
        .discover("prod", &AccountCredentials::new("AKIDEXAMPLE", ""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::MissingCredentials { key: "secret key", .. }
    ));
}

#[tokio::test]
async fn test_rejected_credentials_fail_region_listing() {
    let err = builder(sample_provider())
        .discover("prod", &AccountCredentials::new("AKIDOTHER", "secret"))
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::RegionListing(_)));
}

#[tokio::test]
async fn test_single_region_concurrency() {
    let report = builder(sample_provider())
        .region_concurrency(1)
        .discover("prod", &credentials())
        .await
        .unwrap();

    assert_eq!(report.graph.regions.len(), 2);
}

#[tokio::test]
async fn test_cache_keeps_failed_region_from_previous_run() {
    let cache = InventoryCache::new();

    let full = builder(sample_provider())
        .discover("prod", &credentials())
        .await
        .unwrap();
    cache.apply(&full).await.unwrap();

    let mut fixture = sample_fixture();
    fixture.fail.insert("instances:us-west-2".to_string());
    let partial = builder(Arc::new(FixtureProvider::new(fixture)))
        .discover("prod", &credentials())
        .await
        .unwrap();
    cache.apply(&partial).await.unwrap();

    let cached = cache.get("prod").await.unwrap();
    assert_eq!(cached.graph.regions.len(), 2);
    assert_eq!(cached.failed_regions.len(), 1);
    assert_eq!(cache.accounts().await, vec!["prod".to_string()]);
    assert!(cache.get("staging").await.is_none());
}

#[tokio::test]
async fn test_json_sink_writes_report() {
    let temp_dir = TempDir::new().unwrap();
    let sink = JsonFileSink::new(temp_dir.path().join("inventory"));

    let report = builder(sample_provider())
        .discover("Prod Account", &credentials())
        .await
        .unwrap();
    sink.apply(&report).await.unwrap();

    let path = sink.path_for("Prod Account");
    assert!(path.ends_with("prod_account.json"));

    let written: crate::models::DiscoveryReport =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written.graph, report.graph);
    assert!(!path.with_extension("tmp").exists());
}
