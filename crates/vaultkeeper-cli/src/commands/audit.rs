//! Integrity audit CLI commands.

use clap::{Args, Subcommand};

use vaultkeeper_core::error::AppError;
use vaultkeeper_service::assignment::ExpectedAssignment;

use crate::output::{self, OutputFormat};

/// Arguments for audit commands
#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Audit subcommand
    #[command(subcommand)]
    pub command: AuditCommand,
}

/// Audit subcommands
#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Compare the retention registry with the content store
    Registry,
    /// Compare sidecar ownership with the application's assignments
    Assignments {
        /// JSON file holding `[{"owner_id", "stored_name"}]`
        #[arg(short, long)]
        expected: String,
    },
}

/// Execute audit commands
pub async fn execute(
    args: &AuditArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let services = super::build_services(config_path).await?;

    match &args.command {
        AuditCommand::Registry => {
            let audit = services.admin.audit_integrity().await?;
            if format == OutputFormat::Json {
                output::print_json(&audit);
                return Ok(());
            }
            output::print_kv("Registered", &audit.total.to_string());
            output::print_kv("Present", &audit.present.to_string());
            if audit.missing.is_empty() {
                output::print_success("Every registered file is present");
            } else {
                output::print_error(&format!("{} files missing", audit.missing.len()));
                for name in &audit.missing {
                    println!("    {}", name);
                }
            }
        }
        AuditCommand::Assignments { expected } => {
            let raw = tokio::fs::read(expected)
                .await
                .map_err(|e| AppError::internal(format!("Failed to read '{}': {}", expected, e)))?;
            let expected: Vec<ExpectedAssignment> = serde_json::from_slice(&raw)
                .map_err(|e| AppError::validation(format!("Invalid assignment list: {}", e)))?;

            let report = services.assignment.verify_assignments(&expected).await?;
            if format == OutputFormat::Json {
                output::print_json(&report);
                return Ok(());
            }
            output::print_kv("Checked", &report.checked.to_string());
            if report.orphans.is_empty() && report.missing.is_empty() {
                output::print_success("Content store matches the assignments");
                return Ok(());
            }
            for name in &report.orphans {
                output::print_warning(&format!("Orphan: {}", name));
            }
            for missing in &report.missing {
                output::print_error(&format!(
                    "Missing: {} (owner {})",
                    missing.stored_name, missing.owner_id
                ));
            }
        }
    }

    Ok(())
}
