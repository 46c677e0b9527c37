//! EC2 Agent CLI
//!
//! A command-line tool for registering accounts, inspecting discovered
//! inventory and querying collected series on an ec2-agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{accounts, inventory, series};

/// EC2 Agent CLI
#[derive(Parser)]
#[command(name = "ec2ctl")]
#[command(author, version, about = "CLI for the EC2 inventory and metrics agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via EC2CTL_API_URL env var)
    #[arg(long, env = "EC2CTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage registered accounts
    #[command(subcommand)]
    Accounts(AccountsCommands),

    /// Inspect discovered inventory
    #[command(subcommand)]
    Inventory(InventoryCommands),

    /// Query collected time series
    #[command(subcommand)]
    Series(SeriesCommands),
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Register a new account
    Add {
        /// Account name
        name: String,

        /// Access key id
        #[arg(long, env = "EC2CTL_ACCESS_KEY")]
        access_key: String,

        /// Secret access key
        #[arg(long, env = "EC2CTL_SECRET_KEY", hide_env_values = true)]
        secret_key: String,

        /// Collector that polls this account (default: localhost)
        #[arg(long)]
        collector: Option<String>,
    },

    /// List registered accounts
    List,

    /// Set guest device classes; pass an empty value to clear one
    SetDeviceClass {
        /// Account name
        name: String,

        /// Device class for Linux guests
        #[arg(long)]
        linux: Option<String>,

        /// Device class for Windows guests
        #[arg(long)]
        windows: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// Show the latest inventory of an account
    Show {
        /// Account name
        account: String,

        /// Also list volumes
        #[arg(long)]
        volumes: bool,
    },
}

#[derive(Subcommand)]
pub enum SeriesCommands {
    /// Query samples of one series
    Query {
        /// Series kind (account, instance-type, instance)
        kind: String,

        /// Entity name; instances are addressed as `<region>.<instance-id>`
        entity: String,

        /// Field name (e.g. CPUUtilization, DiskReadOps)
        field: String,

        /// Range start as a unix timestamp
        #[arg(long)]
        start: Option<i64>,

        /// Range end as a unix timestamp (default: now)
        #[arg(long)]
        end: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    // Initialize client
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
    let format = config.format(cli.format);

    // Execute command
    match cli.command {
        Commands::Accounts(cmd) => match cmd {
            AccountsCommands::Add {
                name,
                access_key,
                secret_key,
                collector,
            } => {
                let request = client::NewAccount {
                    name,
                    access_key,
                    secret_key,
                    collector,
                };
                accounts::add_account(&client, request, format).await?;
            }
            AccountsCommands::List => {
                accounts::list_accounts(&client, format).await?;
            }
            AccountsCommands::SetDeviceClass {
                name,
                linux,
                windows,
            } => {
                accounts::set_device_classes(&client, &name, linux, windows, format).await?;
            }
        },
        Commands::Inventory(cmd) => match cmd {
            InventoryCommands::Show { account, volumes } => {
                inventory::show_inventory(&client, &account, volumes, format).await?;
            }
        },
        Commands::Series(cmd) => match cmd {
            SeriesCommands::Query {
                kind,
                entity,
                field,
                start,
                end,
            } => {
                series::query_series(&client, &kind, &entity, &field, start, end, format).await?;
            }
        },
    }

    Ok(())
}
