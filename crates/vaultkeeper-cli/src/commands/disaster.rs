//! Disaster-recovery backup CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::types::format_bytes;
use vaultkeeper_entity::disaster::DisasterListing;

use crate::output::{self, OutputFormat};

/// Arguments for disaster-recovery commands
#[derive(Debug, Args)]
pub struct DisasterArgs {
    /// Disaster-recovery subcommand
    #[command(subcommand)]
    pub command: DisasterCommand,
}

/// Disaster-recovery subcommands
#[derive(Debug, Subcommand)]
pub enum DisasterCommand {
    /// Write a self-contained backup of all tables and files
    Create {
        /// Description stored with the backup
        #[arg(short, long, default_value = "Manual disaster-recovery backup")]
        description: String,
    },
    /// List backups, newest first
    List,
    /// Show what a backup contains
    Show {
        /// Backup ID
        id: String,
    },
    /// Replace tables and content with a backup
    Restore {
        /// Backup ID
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete backups beyond the retention limit
    Clean,
}

/// Backup display row
#[derive(Debug, Serialize, Tabled)]
struct DisasterRow {
    /// Backup ID
    id: String,
    /// Time
    time: String,
    /// Records
    records: u64,
    /// Files
    files: u64,
    /// Estimated size
    size: String,
    /// Description
    description: String,
}

impl From<&DisasterListing> for DisasterRow {
    fn from(l: &DisasterListing) -> Self {
        Self {
            id: l.id.clone(),
            time: l.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            records: l.metadata.total_records,
            files: l.metadata.total_files,
            size: format_bytes(l.metadata.size_estimate),
            description: l.description.clone(),
        }
    }
}

/// Execute disaster-recovery commands
pub async fn execute(
    args: &DisasterArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let services = super::build_services(config_path).await?;
    let admin = &services.admin;

    match &args.command {
        DisasterCommand::Create { description } => {
            let summary = admin.trigger_disaster_backup(description).await?;
            if format == OutputFormat::Json {
                output::print_json(&summary);
                return Ok(());
            }
            output::print_success(&format!("Backup '{}' written", summary.id));
            output::print_kv("Records", &summary.metadata.total_records.to_string());
            output::print_kv("Files", &summary.metadata.total_files.to_string());
            output::print_kv("Size", &format_bytes(summary.metadata.size_estimate));
            if !summary.metadata.failed_tables.is_empty() {
                output::print_warning(&format!(
                    "Tables exported empty after errors: {}",
                    summary.metadata.failed_tables.join(", ")
                ));
            }
        }
        DisasterCommand::List => {
            let rows: Vec<DisasterRow> = admin
                .list_disaster_backups()
                .await?
                .iter()
                .map(DisasterRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        DisasterCommand::Show { id } => {
            let summary = admin.disaster_summary(id).await?;
            if format == OutputFormat::Json {
                output::print_json(&summary);
                return Ok(());
            }
            println!("Backup {}", summary.id);
            output::print_kv("Taken", &summary.timestamp.to_rfc3339());
            output::print_kv("Description", &summary.description);
            for (table, rows) in &summary.tables {
                output::print_kv(table, &format!("{} rows", rows));
            }
            output::print_kv("Files", &summary.files.len().to_string());
        }
        DisasterCommand::Restore { id, yes } => {
            let prompt = format!(
                "Restore disaster-recovery backup '{}'? All non-preserved tables and the content store will be replaced",
                id
            );
            if !output::confirm(&prompt, *yes)? {
                output::print_warning("Restore cancelled");
                return Ok(());
            }

            let report = admin.restore_disaster_backup(id).await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_success(&format!("Backup '{}' restored", report.backup_id));
            output::print_kv("Rows restored", &report.rows_restored.to_string());
            output::print_kv("Files restored", &report.files_restored.to_string());
            if !report.preserved_tables.is_empty() {
                output::print_kv("Preserved", &report.preserved_tables.join(", "));
            }
        }
        DisasterCommand::Clean => {
            let report = admin.clean_disaster_backups().await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_success(&format!(
                "Retained {} backups, deleted {}",
                report.retained,
                report.deleted.len()
            ));
            if !report.stale_removed.is_empty() {
                output::print_warning(&format!(
                    "Removed {} temp files from interrupted backups",
                    report.stale_removed.len()
                ));
            }
        }
    }

    Ok(())
}
