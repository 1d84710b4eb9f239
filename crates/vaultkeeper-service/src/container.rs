//! Builds every service from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use vaultkeeper_core::config::AppConfig;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::RecordStore;
use vaultkeeper_core::types::Namespace;
use vaultkeeper_storage::{LocalStorageProvider, StorageManager};

use crate::admin::AdminService;
use crate::assignment::AssignmentService;
use crate::disaster::DisasterRecoveryEngine;
use crate::guard::OperationGuard;
use crate::protection::{ProtectionEngine, ProtectionManifest};
use crate::retention::RetentionRegistry;
use crate::snapshot::{SnapshotEngine, SnapshotLog};

/// Registry file name inside the registry directory.
const FILE_REGISTRY: &str = "file-registry.json";
/// Protection manifest file name inside the registry directory.
const PROTECTION_MANIFEST: &str = "protection-manifest.json";
/// Snapshot metadata log file name inside the snapshot directory.
const SNAPSHOT_LOG: &str = "metadata-log.json";
/// Operation lock file inside the data root, shared by every process.
const OPERATION_LOCK: &str = ".lock";

/// Every service, wired and sharing one operation guard.
#[derive(Debug, Clone)]
pub struct ServiceContainer {
    /// Configuration the services were built from.
    pub config: AppConfig,
    /// Namespace routing.
    pub storage: StorageManager,
    /// Shared operation guard.
    pub guard: OperationGuard,
    /// Retention registry.
    pub registry: Arc<RetentionRegistry>,
    /// File protection engine.
    pub protection: Arc<ProtectionEngine>,
    /// CV file assignment.
    pub assignment: Arc<AssignmentService>,
    /// Snapshot engine.
    pub snapshots: Arc<SnapshotEngine>,
    /// Disaster-recovery engine.
    pub disaster: Arc<DisasterRecoveryEngine>,
    /// Administrative facade.
    pub admin: Arc<AdminService>,
}

impl ServiceContainer {
    /// Creates storage roots, loads persisted indexes and wires services.
    pub async fn build(config: AppConfig, records: Arc<dyn RecordStore>) -> AppResult<Self> {
        let storage_config = &config.storage;
        let content_root = storage_config.content_root();
        let protection_root = storage_config.resolve(&config.protection.protection_dir);
        let backup_root = storage_config.resolve(&config.protection.backup_dir);
        let emergency_root = storage_config.resolve(&config.protection.emergency_dir);
        let registry_root = storage_config.registry_root();
        let data_root = PathBuf::from(&storage_config.data_root);

        // ── Storage providers ────────────────────────────────────────
        let storage = StorageManager::new();
        let content = Arc::new(LocalStorageProvider::new(&content_root).await?);
        storage.register(Namespace::Content, content.clone()).await;
        storage
            .register(
                Namespace::Protection,
                Arc::new(LocalStorageProvider::new(&protection_root).await?),
            )
            .await;
        storage
            .register(
                Namespace::Backup,
                Arc::new(LocalStorageProvider::new(&backup_root).await?),
            )
            .await;

        // ── Persisted indexes ────────────────────────────────────────
        let registry =
            Arc::new(RetentionRegistry::load(registry_root.join(FILE_REGISTRY), content).await?);
        let manifest = Arc::new(ProtectionManifest::load(registry_root.join(PROTECTION_MANIFEST)).await?);

        let redundancy_dirs: Vec<PathBuf> = vec![
            protection_root,
            backup_root.clone(),
            backup_root.join(&config.protection.versions_dir),
            emergency_root.clone(),
        ];
        registry
            .install_policy_markers(&data_root, &redundancy_dirs)
            .await?;

        // ── Engines ──────────────────────────────────────────────────
        let guard = OperationGuard::with_lock_file(data_root.join(OPERATION_LOCK));
        let protection = Arc::new(ProtectionEngine::new(
            storage.clone(),
            manifest,
            registry.clone(),
            guard.clone(),
            &config.protection,
            emergency_root,
        ));
        let assignment = Arc::new(AssignmentService::new(
            storage.clone(),
            registry.clone(),
            protection.clone(),
            storage_config.max_upload_size_bytes,
        ));

        let snapshot_root = storage_config.resolve(&config.snapshot.directory);
        let snapshot_log = Arc::new(
            SnapshotLog::load(snapshot_root.join(SNAPSHOT_LOG), config.snapshot.metadata_log_cap)
                .await?,
        );
        let snapshots = Arc::new(SnapshotEngine::new(
            records.clone(),
            snapshot_log,
            snapshot_root,
            content_root.clone(),
            config.database.tables.clone(),
            config.snapshot.retain_completed,
        ));

        let disaster = Arc::new(DisasterRecoveryEngine::new(
            records,
            storage_config.resolve(&config.disaster_recovery.directory),
            content_root,
            config.database.tables.clone(),
            config.database.preserved_tables.clone(),
            config.disaster_recovery.retain,
        ));

        let admin = Arc::new(AdminService::new(
            guard.clone(),
            snapshots.clone(),
            disaster.clone(),
            protection.clone(),
            registry.clone(),
        ));

        info!(data_root = %storage_config.data_root, "Services initialized");
        Ok(Self {
            config,
            storage,
            guard,
            registry,
            protection,
            assignment,
            snapshots,
            disaster,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkeeper_core::error::ErrorKind;
    use vaultkeeper_database::MemoryRecordStore;

    async fn container(root: &std::path::Path) -> ServiceContainer {
        let config = AppConfig::with_data_root(root.to_string_lossy());
        let records = Arc::new(MemoryRecordStore::new(config.database.tables.clone()));
        ServiceContainer::build(config, records).await.unwrap()
    }

    #[tokio::test]
    async fn test_build_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        container(dir.path()).await;

        for path in [
            "content-store",
            "protection-store/.keep",
            "backup-store/.keep",
            "backup-store/versions/.keep",
            "emergency/.keep",
            "RETENTION_POLICY.md",
        ] {
            assert!(dir.path().join(path).exists(), "{path} missing");
        }
    }

    fn upload(owner_id: &str) -> crate::CvUpload {
        crate::CvUpload {
            owner_id: owner_id.to_string(),
            owner_key: format!("{owner_id}@example.com"),
            original_name: "cv.pdf".to_string(),
            mime_type: None,
            data: bytes::Bytes::from_static(b"%PDF-1.4"),
        }
    }

    #[tokio::test]
    async fn test_containers_on_one_data_root_share_guard_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let server = container(dir.path()).await;
        let cli = container(dir.path()).await;

        let permit = server.guard.try_begin("snapshot backup").unwrap();
        let err = cli
            .admin
            .trigger_disaster_backup("manual")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.message.contains("snapshot backup"));
        assert_eq!(cli.admin.running_operation().as_deref(), Some("snapshot backup"));
        drop(permit);

        cli.assignment.store(upload("1")).await.unwrap();
        server.assignment.store(upload("2")).await.unwrap();

        let registry_root = server.config.storage.registry_root();
        let content = server.storage.content().await.unwrap();
        let registry = RetentionRegistry::load(registry_root.join(FILE_REGISTRY), content)
            .await
            .unwrap();
        assert_eq!(registry.entries().await.len(), 2);
        let manifest = ProtectionManifest::load(registry_root.join(PROTECTION_MANIFEST))
            .await
            .unwrap();
        let owners: Vec<_> = manifest.records().await.into_iter().map(|r| r.owner_id).collect();
        assert_eq!(owners, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_backup_rejected_while_another_runs() {
        let dir = tempfile::tempdir().unwrap();
        let services = container(dir.path()).await;

        let permit = services.guard.try_begin("disaster-recovery restore").unwrap();
        let err = services
            .admin
            .trigger_snapshot_backup("hourly")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.message.contains("disaster-recovery restore"));
        assert_eq!(
            services.admin.running_operation().as_deref(),
            Some("disaster-recovery restore")
        );

        drop(permit);
        let snapshot = services.admin.trigger_snapshot_backup("hourly").await.unwrap();
        assert!(snapshot.is_completed());
    }
}
