//! Hand-off of discovery results to storage
//!
//! The object store that ultimately owns the inventory is external; this
//! module only defines the seam and two implementations:
//! - [`InventoryCache`] keeps the latest report per account in memory
//! - [`JsonFileSink`] writes each report to `<dir>/<account>.json`

use crate::models::{DiscoveryReport, EntityId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Receives every completed discovery report
#[async_trait]
pub trait InventorySink: Send + Sync {
    async fn apply(&self, report: &DiscoveryReport) -> Result<()>;
}

/// Latest discovery report per account
#[derive(Debug, Clone, Default)]
pub struct InventoryCache {
    reports: Arc<RwLock<HashMap<String, DiscoveryReport>>>,
}

impl InventoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, account: &str) -> Option<DiscoveryReport> {
        self.reports.read().await.get(account).cloned()
    }

    pub async fn accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self.reports.read().await.keys().cloned().collect();
        accounts.sort();
        accounts
    }
}

#[async_trait]
impl InventorySink for InventoryCache {
    /// Regenerate-and-merge: regions missing from the new report (failed
    /// this run) keep their previous inventory
    async fn apply(&self, report: &DiscoveryReport) -> Result<()> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&report.account) {
            Some(existing) => {
                existing.graph.merge(report.graph.clone());
                existing.failed_regions = report.failed_regions.clone();
                existing.discover_guests = report.discover_guests;
                existing.discovered_at = report.discovered_at;
            }
            None => {
                reports.insert(report.account.clone(), report.clone());
            }
        }
        Ok(())
    }
}

/// Writes reports as pretty JSON, one file per account
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, account: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", EntityId::normalize(account)))
    }
}

#[async_trait]
impl InventorySink for JsonFileSink {
    async fn apply(&self, report: &DiscoveryReport) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", self.dir))?;

        let path = self.path_for(&report.account);
        let json = serde_json::to_vec_pretty(report).context("Failed to serialize inventory")?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json)
            .await
            .with_context(|| format!("Failed to write {:?}", temp_path))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        debug!(account = %report.account, path = %path.display(), "Inventory written");
        Ok(())
    }
}
