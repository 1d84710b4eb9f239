//! Protection CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::types::format_bytes;

use crate::output::{self, OutputFormat};

/// Arguments for protection commands
#[derive(Debug, Args)]
pub struct ProtectionArgs {
    /// Protection subcommand
    #[command(subcommand)]
    pub command: ProtectionCommand,
}

/// Protection subcommands
#[derive(Debug, Subcommand)]
pub enum ProtectionCommand {
    /// List protection records
    List,
    /// Re-read every copy and update record statuses
    Verify,
    /// Copy every known-category file into a new emergency folder
    Emergency,
    /// Restore one owner's file from its protection copies
    Restore {
        /// Owner record ID
        owner_id: String,
    },
}

/// Protection record display row
#[derive(Debug, Serialize, Tabled)]
struct ProtectionRow {
    /// Owner ID
    owner: String,
    /// Owner key
    key: String,
    /// Original file name
    file: String,
    /// Copies written
    copies: usize,
    /// Status
    status: String,
    /// Last verified
    verified: String,
}

/// Execute protection commands
pub async fn execute(
    args: &ProtectionArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let services = super::build_services(config_path).await?;
    let admin = &services.admin;

    match &args.command {
        ProtectionCommand::List => {
            let rows: Vec<ProtectionRow> = admin
                .protection_records()
                .await
                .iter()
                .map(|r| ProtectionRow {
                    owner: r.owner_id.clone(),
                    key: r.owner_key.clone(),
                    file: r.original_filename.clone(),
                    copies: r.copies.len(),
                    status: r.status.to_string(),
                    verified: r
                        .verified_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".to_string()),
                })
                .collect();
            output::print_list(&rows, format);
        }
        ProtectionCommand::Verify => {
            let report = admin.verify_protection().await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_kv("Checked", &report.checked.to_string());
            output::print_kv("Verified", &report.verified_count.to_string());
            output::print_kv("Degraded", &report.degraded_count.to_string());
            output::print_kv("Missing", &report.missing_count.to_string());
            if report.lost.is_empty() {
                output::print_success("Every protected file has a healthy copy");
            } else {
                output::print_error(&format!(
                    "No healthy copy left for: {}",
                    report.lost.join(", ")
                ));
            }
        }
        ProtectionCommand::Emergency => {
            let report = admin.emergency_backup().await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_success(&format!(
                "Emergency backup written to {}",
                report.directory.display()
            ));
            for (category, count) in &report.copied {
                output::print_kv(category, &count.to_string());
            }
            output::print_kv("Size", &format_bytes(report.bytes));
            if !report.skipped.is_empty() {
                output::print_warning(&format!("{} files skipped", report.skipped.len()));
            }
        }
        ProtectionCommand::Restore { owner_id } => {
            let stored_name = admin.restore_file(owner_id).await?;
            output::print_success(&format!(
                "File for '{}' restored as '{}'",
                owner_id, stored_name
            ));
        }
    }

    Ok(())
}
