//! Administrative surface: backups, restores, verification and audits.

use std::sync::Arc;

use tracing::info;

use vaultkeeper_core::result::AppResult;
use vaultkeeper_entity::disaster::{DisasterListing, DisasterSummary};
use vaultkeeper_entity::protection::ProtectionRecord;
use vaultkeeper_entity::snapshot::Snapshot;

use crate::disaster::{DisasterCleanupReport, DisasterRecoveryEngine, DisasterRestoreReport};
use crate::guard::OperationGuard;
use crate::protection::{EmergencyBackupReport, ProtectionEngine, VerificationReport};
use crate::retention::{IntegrityAudit, RetentionRegistry};
use crate::snapshot::{CleanupReport, SnapshotEngine, SnapshotRestoreReport};

/// Facade used by the CLI and the scheduler.
///
/// Every operation that mutates backup or content directories takes the
/// operation guard first and is rejected while another one runs.
#[derive(Debug, Clone)]
pub struct AdminService {
    /// Shared operation guard.
    guard: OperationGuard,
    /// Snapshot engine.
    snapshots: Arc<SnapshotEngine>,
    /// Disaster-recovery engine.
    disaster: Arc<DisasterRecoveryEngine>,
    /// File protection engine.
    protection: Arc<ProtectionEngine>,
    /// Retention registry.
    registry: Arc<RetentionRegistry>,
}

impl AdminService {
    /// Creates a new admin service.
    pub fn new(
        guard: OperationGuard,
        snapshots: Arc<SnapshotEngine>,
        disaster: Arc<DisasterRecoveryEngine>,
        protection: Arc<ProtectionEngine>,
        registry: Arc<RetentionRegistry>,
    ) -> Self {
        Self {
            guard,
            snapshots,
            disaster,
            protection,
            registry,
        }
    }

    /// Takes a snapshot backup.
    pub async fn trigger_snapshot_backup(&self, description: &str) -> AppResult<Snapshot> {
        let _permit = self.guard.try_begin("snapshot backup")?;
        self.snapshots.create_backup(description).await
    }

    /// Logged snapshots, newest first.
    pub async fn list_snapshot_backups(&self) -> Vec<Snapshot> {
        self.snapshots.list_backups().await
    }

    /// Restores a snapshot.
    pub async fn restore_snapshot(&self, snapshot_id: &str) -> AppResult<SnapshotRestoreReport> {
        let _permit = self.guard.try_begin("snapshot restore")?;
        info!(snapshot_id, "Snapshot restore requested");
        self.snapshots.restore(snapshot_id).await
    }

    /// Applies snapshot retention.
    pub async fn clean_snapshot_backups(&self) -> AppResult<CleanupReport> {
        let _permit = self.guard.try_begin("snapshot cleanup")?;
        self.snapshots.clean_old_backups().await
    }

    /// Takes a disaster-recovery backup.
    pub async fn trigger_disaster_backup(&self, description: &str) -> AppResult<DisasterSummary> {
        let _permit = self.guard.try_begin("disaster-recovery backup")?;
        self.disaster.create_complete_backup(description).await
    }

    /// Disaster-recovery artifacts, newest first.
    pub async fn list_disaster_backups(&self) -> AppResult<Vec<DisasterListing>> {
        self.disaster.list_backups().await
    }

    /// Destructively restores a disaster-recovery artifact.
    pub async fn restore_disaster_backup(&self, backup_id: &str) -> AppResult<DisasterRestoreReport> {
        let _permit = self.guard.try_begin("disaster-recovery restore")?;
        info!(backup_id, "Disaster-recovery restore requested");
        self.disaster.restore_from_backup(backup_id).await
    }

    /// Applies disaster-recovery retention.
    pub async fn clean_disaster_backups(&self) -> AppResult<DisasterCleanupReport> {
        let _permit = self.guard.try_begin("disaster-recovery cleanup")?;
        self.disaster.clean_old_backups().await
    }

    /// Verifies every protected file.
    pub async fn verify_protection(&self) -> AppResult<VerificationReport> {
        let _permit = self.guard.try_begin("protection verification")?;
        self.protection.verify().await
    }

    /// Copies known-category primaries into a new emergency backup.
    pub async fn emergency_backup(&self) -> AppResult<EmergencyBackupReport> {
        let _permit = self.guard.try_begin("emergency backup")?;
        self.protection.emergency_backup().await
    }

    /// Current protection records.
    pub async fn protection_records(&self) -> Vec<ProtectionRecord> {
        self.protection.records().await
    }

    /// Disaster-recovery summary without loading the artifact.
    pub async fn disaster_summary(&self, backup_id: &str) -> AppResult<DisasterSummary> {
        self.disaster.summary(backup_id).await
    }

    /// Compares the registry with the primary store.
    pub async fn audit_integrity(&self) -> AppResult<IntegrityAudit> {
        self.registry.audit_integrity().await
    }

    /// Restores one owner's file from its protection copies.
    ///
    /// Waits for any running operation instead of failing.
    pub async fn restore_file(&self, owner_id: &str) -> AppResult<String> {
        self.protection.restore(owner_id).await
    }

    /// Name of the operation currently holding the guard, in this process
    /// or another one sharing the data root.
    pub fn running_operation(&self) -> Option<String> {
        self.guard.holder()
    }
}
