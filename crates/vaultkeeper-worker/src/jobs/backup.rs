//! Snapshot and disaster-recovery backup job handlers.
//!
//! Each run takes a backup and then applies retention. A cleanup failure
//! is logged and does not fail a run whose backup succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use vaultkeeper_service::AdminService;

use super::{DISASTER_BACKUP, SNAPSHOT_BACKUP};
use crate::executor::{JobExecutionError, JobHandler};

/// Takes a snapshot backup and prunes old snapshots
#[derive(Debug)]
pub struct SnapshotBackupJobHandler {
    /// Administrative facade
    admin: Arc<AdminService>,
}

impl SnapshotBackupJobHandler {
    /// Create a new snapshot backup job handler
    pub fn new(admin: Arc<AdminService>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl JobHandler for SnapshotBackupJobHandler {
    fn job_type(&self) -> &str {
        SNAPSHOT_BACKUP
    }

    async fn execute(&self) -> Result<Value, JobExecutionError> {
        let snapshot = self
            .admin
            .trigger_snapshot_backup("Scheduled snapshot backup")
            .await
            .map_err(JobExecutionError::from_service)?;

        let deleted = match self.admin.clean_snapshot_backups().await {
            Ok(cleanup) => cleanup.deleted.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot cleanup after backup failed");
                0
            }
        };

        Ok(serde_json::json!({
            "task": SNAPSHOT_BACKUP,
            "snapshot_id": snapshot.id,
            "files": snapshot.file_count,
            "size": snapshot.size_display,
            "failed_tables": snapshot.failed_tables,
            "deleted": deleted,
        }))
    }
}

/// Writes a disaster-recovery artifact and prunes old artifacts
#[derive(Debug)]
pub struct DisasterBackupJobHandler {
    /// Administrative facade
    admin: Arc<AdminService>,
}

impl DisasterBackupJobHandler {
    /// Create a new disaster-recovery backup job handler
    pub fn new(admin: Arc<AdminService>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl JobHandler for DisasterBackupJobHandler {
    fn job_type(&self) -> &str {
        DISASTER_BACKUP
    }

    async fn execute(&self) -> Result<Value, JobExecutionError> {
        let summary = self
            .admin
            .trigger_disaster_backup("Scheduled disaster-recovery backup")
            .await
            .map_err(JobExecutionError::from_service)?;

        let deleted = match self.admin.clean_disaster_backups().await {
            Ok(cleanup) => cleanup.deleted.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Disaster-recovery cleanup after backup failed");
                0
            }
        };

        Ok(serde_json::json!({
            "task": DISASTER_BACKUP,
            "backup_id": summary.id,
            "records": summary.metadata.total_records,
            "files": summary.metadata.total_files,
            "failed_tables": summary.metadata.failed_tables,
            "deleted": deleted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkeeper_core::config::AppConfig;
    use vaultkeeper_database::MemoryRecordStore;
    use vaultkeeper_service::ServiceContainer;

    async fn services(root: &std::path::Path) -> ServiceContainer {
        let config = AppConfig::with_data_root(root.to_string_lossy());
        let records = Arc::new(MemoryRecordStore::new(config.database.tables.clone()));
        ServiceContainer::build(config, records).await.unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_job_reports_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path()).await;
        let handler = SnapshotBackupJobHandler::new(services.admin.clone());

        let report = handler.execute().await.unwrap();
        let id = report["snapshot_id"].as_str().unwrap();
        assert!(id.starts_with("snapshot-"));
        assert_eq!(report["deleted"], 0);
        assert_eq!(services.admin.list_snapshot_backups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_disaster_job_skipped_while_restore_runs() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path()).await;
        let handler = DisasterBackupJobHandler::new(services.admin.clone());

        let permit = services.guard.try_begin("snapshot restore").unwrap();
        let err = handler.execute().await.unwrap_err();
        assert!(matches!(err, JobExecutionError::Transient(_)));
        drop(permit);

        let report = handler.execute().await.unwrap();
        assert!(report["backup_id"].as_str().unwrap().starts_with("dr-"));
        assert_eq!(services.admin.list_disaster_backups().await.unwrap().len(), 1);
    }
}
