//! Protection verification and emergency backup job handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use vaultkeeper_service::AdminService;

use super::{EMERGENCY_BACKUP, VERIFY_PROTECTION};
use crate::executor::{JobExecutionError, JobHandler};

/// Re-reads every protection copy and reports lost files
#[derive(Debug)]
pub struct VerifyProtectionJobHandler {
    /// Administrative facade
    admin: Arc<AdminService>,
}

impl VerifyProtectionJobHandler {
    /// Create a new verification job handler
    pub fn new(admin: Arc<AdminService>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl JobHandler for VerifyProtectionJobHandler {
    fn job_type(&self) -> &str {
        VERIFY_PROTECTION
    }

    async fn execute(&self) -> Result<Value, JobExecutionError> {
        let report = self
            .admin
            .verify_protection()
            .await
            .map_err(JobExecutionError::from_service)?;

        if report.missing_count > 0 {
            tracing::error!(
                missing = report.missing_count,
                lost = ?report.lost,
                "Protected files have no healthy copy left"
            );
        }

        Ok(serde_json::json!({
            "task": VERIFY_PROTECTION,
            "checked": report.checked,
            "verified": report.verified_count,
            "degraded": report.degraded_count,
            "missing": report.missing_count,
        }))
    }
}

/// Copies every known-category primary into a timestamped emergency folder
#[derive(Debug)]
pub struct EmergencyBackupJobHandler {
    /// Administrative facade
    admin: Arc<AdminService>,
}

impl EmergencyBackupJobHandler {
    /// Create a new emergency backup job handler
    pub fn new(admin: Arc<AdminService>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl JobHandler for EmergencyBackupJobHandler {
    fn job_type(&self) -> &str {
        EMERGENCY_BACKUP
    }

    async fn execute(&self) -> Result<Value, JobExecutionError> {
        let report = self
            .admin
            .emergency_backup()
            .await
            .map_err(JobExecutionError::from_service)?;

        Ok(serde_json::json!({
            "task": EMERGENCY_BACKUP,
            "directory": report.directory.display().to_string(),
            "copied": report.copied,
            "bytes": report.bytes,
            "skipped": report.skipped.len(),
            "pruned": report.pruned.len(),
        }))
    }
}
