//! Error types for the agent library
//!
//! Errors are split along the lines operators care about:
//! - provider failures (throttling vs. everything else)
//! - query outcomes after the backoff policy has run
//! - discovery, store and account configuration errors

use thiserror::Error;

/// Failure reported by the cloud provider for a single call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider rejected the request because of rate limiting
    #[error("request throttled by provider: {0}")]
    Throttling(String),

    /// Credentials were rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other request failure (unreachable region, malformed request, ...)
    #[error("provider request failed: {0}")]
    Request(String),
}

impl ProviderError {
    /// Returns true for throttling-class failures that are worth retrying
    pub fn is_throttling(&self) -> bool {
        matches!(self, ProviderError::Throttling(_))
    }
}

/// Result of running a provider call through the query executor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Every attempt was throttled
    #[error("permanently throttled after {attempts} attempts")]
    PermanentlyThrottled { attempts: u32 },

    /// A non-throttling failure, returned without retry
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl QueryError {
    pub fn is_permanently_throttled(&self) -> bool {
        matches!(self, QueryError::PermanentlyThrottled { .. })
    }
}

/// Errors that abort a whole discovery run
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("account {account}: {key} not set, not discovering")]
    MissingCredentials { account: String, key: &'static str },

    #[error("failed to list regions: {0}")]
    RegionListing(#[source] QueryError),
}

/// Time-series store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("field {field} is not a recognized series field")]
    UnrecognizedField { field: String },

    #[error("sample at {timestamp} for {key} is older than the retention window (oldest kept {oldest})")]
    OutsideRetention {
        key: String,
        timestamp: i64,
        oldest: i64,
    },

    #[error("series storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize series {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Management console errors for account registration and settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("A device named {0} already exists.")]
    AlreadyExists(String),

    #[error("account {0} not found")]
    NotFound(String),

    #[error("invalid account settings: {0}")]
    Invalid(String),
}
