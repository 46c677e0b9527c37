//! EC2 Agent - inventory discovery and metrics collection daemon
//!
//! Discovers the EC2 inventory of every registered account, polls instance
//! and volume metrics each interval and keeps them in fixed-retention
//! series served over HTTP.

use agent_lib::{
    accounts::AccountRegistry,
    collector::{series_names, CollectionConfig, CollectionLoopBuilder, MetricsAggregator},
    health::HealthRegistry,
    inventory::{InventoryBuilder, InventoryCache, JsonFileSink},
    observability::StructuredLogger,
    provider::{CloudProvider, FixtureProvider, ProviderFixture},
    query::{BackoffPolicy, QueryExecutor},
    store::{RetentionPolicy, TimeSeriesStore, DEFAULT_STEP_SECS},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ec2-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        collector = %config.collector_name,
        poll_interval_secs = config.poll_interval_secs,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.collector_name);

    let provider: Arc<dyn CloudProvider> = match &config.fixture_path {
        Some(path) => Arc::new(FixtureProvider::from_file(path)?),
        None => {
            warn!("No provider snapshot configured, discovery will find no regions");
            Arc::new(FixtureProvider::new(ProviderFixture::default()))
        }
    };
    let executor = QueryExecutor::new(BackoffPolicy::new(
        config.backoff_initial_delay(),
        config.backoff_max_attempts,
    ));

    let store = Arc::new(
        TimeSeriesStore::open(
            &config.series_dir,
            series_names(),
            RetentionPolicy::new(DEFAULT_STEP_SECS, config.series_rows),
        )
        .with_context(|| format!("Failed to open series store at {:?}", config.series_dir))?,
    );
    info!(series = store.series_count(), "Series store opened");

    let accounts = AccountRegistry::new();
    let inventory = InventoryCache::new();

    let mut builder = CollectionLoopBuilder::new()
        .accounts(accounts.clone())
        .inventory_builder(
            InventoryBuilder::new(provider.clone(), executor.clone())
                .region_concurrency(config.region_concurrency),
        )
        .aggregator(
            MetricsAggregator::new(provider, executor).query_concurrency(config.query_concurrency),
        )
        .store(store.clone())
        .cache(inventory.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .config(CollectionConfig {
            interval: config.poll_interval(),
            lookback_secs: config.lookback_secs,
            clock_skew_secs: config.clock_skew_secs,
            discovery_interval: config.discovery_interval(),
        });
    if let Some(dir) = &config.inventory_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create inventory directory {:?}", dir))?;
        builder = builder.sink(Arc::new(JsonFileSink::new(dir)));
    }
    let collection_loop = builder.build()?;

    logger.log_startup(AGENT_VERSION, accounts.len().await);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        logger.clone(),
        accounts,
        inventory,
        store,
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(collection_loop.run(shutdown_rx));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Mark agent as ready after initialization
    health_registry.set_ready(true);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false);

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Collection loop task failed");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
