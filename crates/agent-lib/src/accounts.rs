//! Registered cloud accounts
//!
//! Backs the two management operations: registering an account and setting
//! its guest device-class overrides. Secret keys never leave the registry
//! except through [`AccountRegistry::credentials`].

use crate::error::AccountError;
use crate::models::{AccountCredentials, EntityId};
use crate::observability::AgentMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Collector assigned when a registration names none
pub const DEFAULT_COLLECTOR: &str = "localhost";

/// Registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub collector: Option<String>,
}

/// Public view of a registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub id: EntityId,
    pub access_key: String,
    pub collector: String,
    pub linux_device_class: Option<String>,
    pub windows_device_class: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    account: Account,
    secret_key: String,
}

/// Concurrency-safe account registry
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Arc<RwLock<BTreeMap<String, Entry>>>,
    metrics: AgentMetrics,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account
    ///
    /// Fails when an account with the same name, or a name normalizing to
    /// the same id, is already registered.
    pub async fn add_account(&self, request: NewAccount) -> Result<Account, AccountError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AccountError::Invalid("account name is required".to_string()));
        }
        if request.access_key.trim().is_empty() {
            return Err(AccountError::Invalid("access key is required".to_string()));
        }
        if request.secret_key.trim().is_empty() {
            return Err(AccountError::Invalid("secret key is required".to_string()));
        }

        let id = EntityId::normalize(&name);
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&name) || accounts.values().any(|e| e.account.id == id) {
            return Err(AccountError::AlreadyExists(name));
        }

        let account = Account {
            name: name.clone(),
            id,
            access_key: request.access_key.trim().to_string(),
            collector: non_blank(request.collector).unwrap_or_else(|| DEFAULT_COLLECTOR.to_string()),
            linux_device_class: None,
            windows_device_class: None,
            registered_at: Utc::now(),
        };

        accounts.insert(
            name,
            Entry {
                account: account.clone(),
                secret_key: request.secret_key.trim().to_string(),
            },
        );
        self.metrics.set_accounts_registered(accounts.len() as i64);

        debug!(account = %account.name, id = %account.id, "Account stored");
        Ok(account)
    }

    /// Set the guest device classes; empty values clear the override
    pub async fn set_device_classes(
        &self,
        name: &str,
        linux: Option<String>,
        windows: Option<String>,
    ) -> Result<Account, AccountError> {
        let mut accounts = self.accounts.write().await;
        let entry = accounts
            .get_mut(name)
            .ok_or_else(|| AccountError::NotFound(name.to_string()))?;

        entry.account.linux_device_class = non_blank(linux);
        entry.account.windows_device_class = non_blank(windows);
        Ok(entry.account.clone())
    }

    pub async fn get(&self, name: &str) -> Option<Account> {
        self.accounts
            .read()
            .await
            .get(name)
            .map(|e| e.account.clone())
    }

    /// Accounts sorted by name
    pub async fn list(&self) -> Vec<Account> {
        self.accounts
            .read()
            .await
            .values()
            .map(|e| e.account.clone())
            .collect()
    }

    pub async fn credentials(&self, name: &str) -> Option<AccountCredentials> {
        self.accounts.read().await.get(name).map(|e| {
            AccountCredentials::new(e.account.access_key.clone(), e.secret_key.clone())
        })
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            collector: Some("collector-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_add_account() {
        let registry = AccountRegistry::new();
        let account = registry.add_account(request("Prod")).await.unwrap();

        assert_eq!(account.name, "Prod");
        assert_eq!(account.id.as_str(), "prod");
        assert_eq!(account.collector, "collector-1");
        assert_eq!(registry.len().await, 1);

        let creds = registry.credentials("Prod").await.unwrap();
        assert_eq!(creds.secret_key, "secret");
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let registry = AccountRegistry::new();
        registry.add_account(request("prod")).await.unwrap();

        let err = registry.add_account(request("prod")).await.unwrap_err();
        assert_eq!(err, AccountError::AlreadyExists("prod".to_string()));
        assert_eq!(err.to_string(), "A device named prod already exists.");

        // Same id once normalized
        let err = registry.add_account(request("PROD")).await.unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_fields_are_rejected() {
        let registry = AccountRegistry::new();

        let mut missing_key = request("prod");
        missing_key.secret_key = "  ".to_string();
        assert!(matches!(
            registry.add_account(missing_key).await,
            Err(AccountError::Invalid(_))
        ));
        assert!(matches!(
            registry.add_account(request("")).await,
            Err(AccountError::Invalid(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_default_collector() {
        let registry = AccountRegistry::new();
        let mut req = request("prod");
        req.collector = Some(String::new());

        let account = registry.add_account(req).await.unwrap();
        assert_eq!(account.collector, DEFAULT_COLLECTOR);
    }

    #[tokio::test]
    async fn test_set_device_classes() {
        let registry = AccountRegistry::new();
        registry.add_account(request("prod")).await.unwrap();

        let account = registry
            .set_device_classes(
                "prod",
                Some("/Server/Linux".to_string()),
                Some("/Server/Windows".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(account.linux_device_class.as_deref(), Some("/Server/Linux"));

        // Empty clears
        let account = registry
            .set_device_classes("prod", Some(String::new()), None)
            .await
            .unwrap();
        assert_eq!(account.linux_device_class, None);
        assert_eq!(account.windows_device_class, None);
    }

    #[tokio::test]
    async fn test_set_device_classes_unknown_account() {
        let registry = AccountRegistry::new();
        let err = registry
            .set_device_classes("missing", None, None)
            .await
            .unwrap_err();
        assert_eq!(err, AccountError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = AccountRegistry::new();
        registry.add_account(request("staging")).await.unwrap();
        registry.add_account(request("dev")).await.unwrap();

        let names: Vec<String> = registry.list().await.into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["dev", "staging"]);
    }
}
