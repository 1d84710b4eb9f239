//! Snapshot backup CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use vaultkeeper_core::error::AppError;
use vaultkeeper_entity::snapshot::Snapshot;

use crate::output::{self, OutputFormat};

/// Arguments for snapshot commands
#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Snapshot subcommand
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

/// Snapshot subcommands
#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Take a snapshot of the tables and the content store
    Create {
        /// Description stored with the snapshot
        #[arg(short, long, default_value = "Manual snapshot")]
        description: String,
    },
    /// List logged snapshots, newest first
    List,
    /// Restore tables and content from a snapshot
    Restore {
        /// Snapshot ID
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete snapshots beyond the retention limit
    Clean,
}

/// Snapshot display row
#[derive(Debug, Serialize, Tabled)]
struct SnapshotRow {
    /// Snapshot ID
    id: String,
    /// Time
    time: String,
    /// Status
    status: String,
    /// Files
    files: u64,
    /// Size
    size: String,
    /// Description
    description: String,
}

impl From<&Snapshot> for SnapshotRow {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id.clone(),
            time: s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: s.status.to_string(),
            files: s.file_count,
            size: s.size_display.clone(),
            description: s.description.clone(),
        }
    }
}

/// Execute snapshot commands
pub async fn execute(
    args: &SnapshotArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let services = super::build_services(config_path).await?;
    let admin = &services.admin;

    match &args.command {
        SnapshotCommand::Create { description } => {
            let snapshot = admin.trigger_snapshot_backup(description).await?;
            if format == OutputFormat::Json {
                output::print_json(&snapshot);
                return Ok(());
            }
            output::print_success(&format!("Snapshot '{}' created", snapshot.id));
            output::print_kv("Files", &snapshot.file_count.to_string());
            output::print_kv("Size", &snapshot.size_display);
            for (table, count) in &snapshot.table_counts {
                output::print_kv(table, &format!("{} rows", count));
            }
            if !snapshot.failed_tables.is_empty() {
                output::print_warning(&format!(
                    "Tables exported empty after errors: {}",
                    snapshot.failed_tables.join(", ")
                ));
            }
        }
        SnapshotCommand::List => {
            let rows: Vec<SnapshotRow> = admin
                .list_snapshot_backups()
                .await
                .iter()
                .map(SnapshotRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        SnapshotCommand::Restore { id, yes } => {
            let prompt = format!(
                "Restore snapshot '{}'? Current table rows and content files will be replaced",
                id
            );
            if !output::confirm(&prompt, *yes)? {
                output::print_warning("Restore cancelled");
                return Ok(());
            }

            let report = admin.restore_snapshot(id).await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_success(&format!("Snapshot '{}' restored", report.snapshot_id));
            for (table, rows) in &report.tables {
                output::print_kv(table, &format!("{} rows", rows));
            }
            output::print_kv("Files restored", &report.files_restored.to_string());
            if let Some(previous) = &report.previous_content {
                output::print_kv("Previous content", &previous.display().to_string());
            }
            if !report.skipped_tables.is_empty() {
                output::print_warning(&format!(
                    "Tables skipped: {}",
                    report.skipped_tables.join(", ")
                ));
            }
        }
        SnapshotCommand::Clean => {
            let report = admin.clean_snapshot_backups().await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_success(&format!(
                "Retained {} snapshots, deleted {}",
                report.retained,
                report.deleted.len()
            ));
        }
    }

    Ok(())
}
