//! Component health for liveness and readiness checks
//!
//! Discovery health is kept per account, so a clean run for one account
//! never hides failed regions of another. Throttling and partial failures
//! degrade a component; only a component that cannot work at all is
//! unhealthy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, with part of its input missing
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status of any component; healthy when none are registered
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const DISCOVERY: &str = "discovery";
    pub const COLLECTOR: &str = "collector";
    pub const STORE: &str = "store";
    pub const API: &str = "api";

    pub const ALL: [&str; 4] = [DISCOVERY, COLLECTOR, STORE, API];
}

/// How one account's discovery run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Complete,
    /// Graph built, with this many regions left out
    RegionsFailed(usize),
    /// No graph was built
    Failed(String),
}

impl fmt::Display for DiscoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::RegionsFailed(1) => f.write_str("1 region failed"),
            Self::RegionsFailed(n) => write!(f, "{} regions failed", n),
            Self::Failed(error) => f.write_str(error),
        }
    }
}

/// Shared health state of the agent's components
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    /// Accounts whose last discovery run was not complete
    discovery_problems: Arc<RwLock<BTreeMap<String, DiscoveryOutcome>>>,
    ready: Arc<AtomicBool>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn register_all(&self) {
        for name in components::ALL {
            self.register(name).await;
        }
    }

    pub async fn status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.read().await.get(name).map(|h| h.status)
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record an account's discovery run and recompute discovery health
    ///
    /// Discovery is degraded while any account's last run left regions out
    /// or failed outright.
    pub async fn record_discovery(&self, account: &str, outcome: DiscoveryOutcome) {
        let mut problems = self.discovery_problems.write().await;
        match outcome {
            DiscoveryOutcome::Complete => {
                problems.remove(account);
            }
            outcome => {
                problems.insert(account.to_string(), outcome);
            }
        }

        let health = if problems.is_empty() {
            ComponentHealth::healthy()
        } else {
            let summary: Vec<String> = problems
                .iter()
                .map(|(account, outcome)| format!("{}: {}", account, outcome))
                .collect();
            ComponentHealth::degraded(summary.join("; "))
        };
        self.update(components::DISCOVERY, health).await;
    }

    /// Record a finished collection cycle
    pub async fn record_cycle(&self, skipped_fields: usize) {
        let health = match skipped_fields {
            0 => ComponentHealth::healthy(),
            n => ComponentHealth::degraded(format!("{} fields skipped in last cycle", n)),
        };
        self.update(components::COLLECTOR, health).await;
    }

    /// Record a cycle that overran its interval
    pub async fn record_abandoned_cycle(&self) {
        self.update(
            components::COLLECTOR,
            ComponentHealth::degraded("Last collection cycle was abandoned"),
        )
        .await;
    }

    /// Record the result of flushing series to disk
    pub async fn record_flush<E: fmt::Display>(&self, result: &Result<usize, E>) {
        let health = match result {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::degraded(format!("Flush failed: {}", e)),
        };
        self.update(components::STORE, health).await;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub async fn health(&self) -> HealthResponse {
        let components: BTreeMap<String, ComponentHealth> = self
            .components
            .read()
            .await
            .iter()
            .map(|(name, health)| (name.clone(), health.clone()))
            .collect();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once startup finished and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let reason = if !self.ready.load(Ordering::SeqCst) {
            Some("Agent not yet initialized")
        } else if !self.health().await.status.is_operational() {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
