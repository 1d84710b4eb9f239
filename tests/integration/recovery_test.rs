//! End-to-end recovery tests: self-healing reads, snapshot restores and
//! disaster-recovery round trips against a temporary data root.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use vaultkeeper_core::config::AppConfig;
use vaultkeeper_core::traits::RecordStore;
use vaultkeeper_database::MemoryRecordStore;
use vaultkeeper_entity::protection::ProtectionStatus;
use vaultkeeper_service::{CvUpload, ServiceContainer};

/// Test application context
struct TestApp {
    /// Wired services
    services: ServiceContainer,
    /// Concrete record store, for row counts
    records: Arc<MemoryRecordStore>,
    /// Keeps the data root alive
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::with_data_root(dir.path().to_string_lossy());
        let records = Arc::new(
            MemoryRecordStore::new(config.database.tables.clone()).with_foreign_key("cvs", "jobs"),
        );
        let services = ServiceContainer::build(config, records.clone())
            .await
            .unwrap();
        Self {
            services,
            records,
            _dir: dir,
        }
    }

    async fn upload(&self, owner_id: &str, owner_key: &str, name: &str, data: &'static [u8]) -> String {
        let stored = self
            .services
            .assignment
            .store(CvUpload {
                owner_id: owner_id.to_string(),
                owner_key: owner_key.to_string(),
                original_name: name.to_string(),
                mime_type: None,
                data: Bytes::from_static(data),
            })
            .await
            .unwrap();
        stored.stored_name
    }

    async fn delete_primary(&self, stored_name: &str) {
        let content = self.services.storage.content().await.unwrap();
        content.delete(stored_name).await.unwrap();
    }

    async fn primary_exists(&self, stored_name: &str) -> bool {
        let content = self.services.storage.content().await.unwrap();
        content.exists(stored_name).await.unwrap()
    }
}

#[tokio::test]
async fn test_deleted_cv_is_restored_on_read() {
    let app = TestApp::new().await;
    let data: &'static [u8] = b"%PDF-1.4 curriculum vitae";

    let stored = app
        .services
        .assignment
        .store(CvUpload {
            owner_id: "42".to_string(),
            owner_key: "a@x.com".to_string(),
            original_name: "a.pdf".to_string(),
            mime_type: None,
            data: Bytes::from_static(data),
        })
        .await
        .unwrap();
    let protection = stored.protection.clone().unwrap();
    assert_eq!(protection.copies.len(), 3);
    assert_eq!(protection.status, ProtectionStatus::Protected);

    app.delete_primary(&stored.stored_name).await;

    let recovered = app
        .services
        .assignment
        .read("42", &stored.stored_name)
        .await
        .unwrap();
    assert!(recovered.restored);
    assert_ne!(recovered.stored_name, stored.stored_name);
    assert_eq!(recovered.data.as_ref(), data);
    assert!(app.primary_exists(&recovered.stored_name).await);

    for copy in &protection.copies {
        let provider = app.services.storage.get(copy.namespace).await.unwrap();
        let bytes = provider.read_bytes(&copy.path).await.unwrap();
        assert_eq!(bytes.as_ref(), data, "copy {copy} changed");
    }

    let audit = app.services.admin.audit_integrity().await.unwrap();
    assert_eq!(audit.total, 2);
    assert_eq!(audit.missing, vec![stored.stored_name.clone()]);
}

#[tokio::test]
async fn test_snapshot_restore_brings_back_rows_and_files() {
    let app = TestApp::new().await;
    app.records
        .import_table("jobs", vec![json!({"id": 1, "title": "Welder"})])
        .await
        .unwrap();
    let stored_name = app.upload("7", "b@x.com", "b.pdf", b"%PDF b").await;

    let snapshot = app
        .services
        .admin
        .trigger_snapshot_backup("before cleanup")
        .await
        .unwrap();
    assert!(snapshot.is_completed());
    assert_eq!(snapshot.table_counts["jobs"], 1);

    app.records.clear_table("jobs").await.unwrap();
    app.delete_primary(&stored_name).await;

    let report = app.services.admin.restore_snapshot(&snapshot.id).await.unwrap();
    assert_eq!(report.tables["jobs"], 1);
    assert!(report.previous_content.is_some());
    assert_eq!(app.records.count("jobs").await.unwrap(), 1);
    assert!(app.primary_exists(&stored_name).await);
}

#[tokio::test]
async fn test_disaster_recovery_round_trip_keeps_preserved_tables() {
    let app = TestApp::new().await;
    app.records
        .import_table("whitelist", vec![json!({"id": 1, "email": "a@x.com"})])
        .await
        .unwrap();
    app.records
        .import_table("jobs", vec![json!({"id": 1}), json!({"id": 2})])
        .await
        .unwrap();
    app.records
        .import_table("cvs", vec![json!({"id": 10, "job_id": 1})])
        .await
        .unwrap();
    let stored_name = app.upload("10", "a@x.com", "a.pdf", b"%PDF a").await;

    let summary = app
        .services
        .admin
        .trigger_disaster_backup("nightly")
        .await
        .unwrap();
    assert_eq!(summary.metadata.total_records, 4);

    app.records
        .import_table("whitelist", vec![json!({"id": 2, "email": "c@x.com"})])
        .await
        .unwrap();
    app.records
        .import_table("jobs", vec![json!({"id": 3})])
        .await
        .unwrap();
    app.delete_primary(&stored_name).await;

    let report = app
        .services
        .admin
        .restore_disaster_backup(&summary.id)
        .await
        .unwrap();
    assert!(report.preserved_tables.contains(&"whitelist".to_string()));
    assert_eq!(app.records.count("jobs").await.unwrap(), 2);
    assert_eq!(app.records.count("cvs").await.unwrap(), 1);
    assert_eq!(app.records.count("whitelist").await.unwrap(), 2);
    assert!(app.primary_exists(&stored_name).await);

    let listed = app.services.admin.list_disaster_backups().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, summary.id);
}
