//! CLI command definitions and dispatch.

pub mod audit;
pub mod config;
pub mod disaster;
pub mod protection;
pub mod snapshot;

use clap::{Parser, Subcommand};

use vaultkeeper_core::config::AppConfig;
use vaultkeeper_core::error::AppError;
use vaultkeeper_service::ServiceContainer;

use crate::output::OutputFormat;

/// Vaultkeeper: artifact protection and disaster recovery
#[derive(Debug, Parser)]
#[command(name = "vaultkeeper", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Directory snapshot backups
    Snapshot(snapshot::SnapshotArgs),
    /// Disaster-recovery backups
    Disaster(disaster::DisasterArgs),
    /// Redundant file copies
    Protection(protection::ProtectionArgs),
    /// Registry and assignment audits
    Audit(audit::AuditArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Snapshot(args) => snapshot::execute(args, &self.config, self.format).await,
            Commands::Disaster(args) => disaster::execute(args, &self.config, self.format).await,
            Commands::Protection(args) => {
                protection::execute(args, &self.config, self.format).await
            }
            Commands::Audit(args) => audit::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: connect the record store and wire every service
pub async fn build_services(config_path: &str) -> Result<ServiceContainer, AppError> {
    let config = load_config(config_path)?;
    let records = vaultkeeper_database::connect_record_store(&config.database).await?;
    ServiceContainer::build(config, records).await
}
