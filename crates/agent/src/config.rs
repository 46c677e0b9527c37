//! Agent configuration

use agent_lib::query::BackoffPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name of this collector, attached to structured log records
    #[serde(default = "default_collector_name")]
    pub collector_name: String,

    /// API server port for health, metrics and account management
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Polling interval in seconds, also the cycle timeout
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Metric lookback per cycle in seconds
    #[serde(default = "default_lookback")]
    pub lookback_secs: u32,

    /// Extra seconds added to the start of each metric window
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u32,

    /// Inventory older than this is rediscovered
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    /// First backoff delay for throttled provider calls
    #[serde(default = "default_backoff_initial_delay")]
    pub backoff_initial_delay_ms: u64,

    /// Total attempts per provider call, including the first
    #[serde(default = "default_backoff_max_attempts")]
    pub backoff_max_attempts: u32,

    /// Regions discovered concurrently per account
    #[serde(default = "default_region_concurrency")]
    pub region_concurrency: usize,

    /// Entity metric fetches in flight per account
    #[serde(default = "default_query_concurrency")]
    pub query_concurrency: usize,

    /// Directory holding one file per series
    #[serde(default = "default_series_dir")]
    pub series_dir: PathBuf,

    /// Rows kept per series
    #[serde(default = "default_series_rows")]
    pub series_rows: usize,

    /// Where discovery reports are written as JSON (disabled when unset)
    #[serde(default)]
    pub inventory_dir: Option<PathBuf>,

    /// Provider snapshot served in place of a live provider
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

fn default_collector_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    300
}

fn default_lookback() -> u32 {
    300
}

fn default_clock_skew() -> u32 {
    5
}

fn default_discovery_interval() -> u64 {
    3600
}

fn default_backoff_initial_delay() -> u64 {
    1000
}

fn default_backoff_max_attempts() -> u32 {
    4
}

fn default_region_concurrency() -> usize {
    4
}

fn default_query_concurrency() -> usize {
    8
}

fn default_series_dir() -> PathBuf {
    PathBuf::from("/var/lib/ec2-agent/perf")
}

fn default_series_rows() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector_name: default_collector_name(),
            api_port: default_api_port(),
            poll_interval_secs: default_poll_interval(),
            lookback_secs: default_lookback(),
            clock_skew_secs: default_clock_skew(),
            discovery_interval_secs: default_discovery_interval(),
            backoff_initial_delay_ms: default_backoff_initial_delay(),
            backoff_max_attempts: default_backoff_max_attempts(),
            region_concurrency: default_region_concurrency(),
            query_concurrency: default_query_concurrency(),
            series_dir: default_series_dir(),
            series_rows: default_series_rows(),
            inventory_dir: None,
            fixture_path: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// The file path comes from `EC2_AGENT_CONFIG` (default `ec2-agent.toml`);
    /// `EC2_AGENT_*` variables override it.
    pub fn load() -> Result<Self> {
        let path = std::env::var("EC2_AGENT_CONFIG").unwrap_or_else(|_| "ec2-agent.toml".to_string());

        let config: AgentConfig = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("EC2_AGENT"))
            .build()
            .context("Failed to load agent configuration")?
            .try_deserialize()
            .context("Invalid agent configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the collection loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.discovery_interval_secs == 0 {
            anyhow::bail!("discovery_interval_secs must be greater than zero");
        }
        if self.lookback_secs == 0 {
            anyhow::bail!("lookback_secs must be greater than zero");
        }
        if self.backoff_max_attempts == 0 || self.backoff_max_attempts > BackoffPolicy::MAX_ATTEMPTS {
            anyhow::bail!(
                "backoff_max_attempts must be between 1 and {}",
                BackoffPolicy::MAX_ATTEMPTS
            );
        }
        if self.region_concurrency == 0 || self.query_concurrency == 0 {
            anyhow::bail!("region_concurrency and query_concurrency must be greater than zero");
        }
        if self.series_rows == 0 {
            anyhow::bail!("series_rows must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn backoff_initial_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_delay_ms)
    }
}
