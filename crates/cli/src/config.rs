//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Default output format
    pub default_format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from the user's config file, if any
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Command-line value, then config file, then the local agent
    pub fn api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn format(&self, flag: Option<OutputFormat>) -> OutputFormat {
        flag.or(self.default_format).unwrap_or_default()
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("ec2ctl").join("config.json"))
    }
}
