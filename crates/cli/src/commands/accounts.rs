//! Account management commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{Account, ApiClient, DeviceClasses, NewAccount};
use crate::output::{or_dash, print_info, print_json, print_rows, print_success, print_warning, OutputFormat};

/// Row for accounts table
#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Access Key")]
    access_key: String,
    #[tabled(rename = "Collector")]
    collector: String,
    #[tabled(rename = "Linux Class")]
    linux_device_class: String,
    #[tabled(rename = "Windows Class")]
    windows_device_class: String,
    #[tabled(rename = "Registered")]
    registered_at: String,
}

impl From<&Account> for AccountRow {
    fn from(a: &Account) -> Self {
        Self {
            name: a.name.clone(),
            access_key: a.access_key.clone(),
            collector: a.collector.clone(),
            linux_device_class: or_dash(a.linux_device_class.as_deref()),
            windows_device_class: or_dash(a.windows_device_class.as_deref()),
            registered_at: a.registered_at.clone(),
        }
    }
}

/// Register a new account
pub async fn add_account(
    client: &ApiClient,
    request: NewAccount,
    format: OutputFormat,
) -> Result<()> {
    let account: Account = client.post(&["api", "v1", "accounts"], &request).await?;

    match format {
        OutputFormat::Json => print_json(&account)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Account {} registered on collector {}",
                account.name, account.collector
            ));
            print_info("Inventory is discovered on the next collection cycle");
        }
    }

    Ok(())
}

/// List registered accounts
pub async fn list_accounts(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let accounts: Vec<Account> = client.get(&["api", "v1", "accounts"]).await?;

    match format {
        OutputFormat::Json => print_json(&accounts)?,
        OutputFormat::Table => {
            if accounts.is_empty() {
                print_warning("No accounts registered");
                return Ok(());
            }
            print_rows(accounts.iter().map(AccountRow::from).collect());
            println!("\nTotal: {} accounts", accounts.len());
        }
    }

    Ok(())
}

/// Set guest device classes; an empty value clears the override
pub async fn set_device_classes(
    client: &ApiClient,
    name: &str,
    linux: Option<String>,
    windows: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let body = DeviceClasses {
        linux_device_class: linux,
        windows_device_class: windows,
    };
    let account: Account = client
        .put(&["api", "v1", "accounts", name, "device-classes"], &body)
        .await?;

    match format {
        OutputFormat::Json => print_json(&account)?,
        OutputFormat::Table => {
            print_success(&format!("Device classes updated for {}", account.name));
            println!("  Linux:   {}", or_dash(account.linux_device_class.as_deref()));
            println!("  Windows: {}", or_dash(account.windows_device_class.as_deref()));
        }
    }

    Ok(())
}
