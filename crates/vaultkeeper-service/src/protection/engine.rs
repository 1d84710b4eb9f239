//! Redundant copy protection: fan-out, verification, restore and emergency
//! backups.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info, warn};
use uuid::Uuid;

use vaultkeeper_core::config::ProtectionConfig;
use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::types::Namespace;
use vaultkeeper_entity::file::{FileCategory, FileMetadata, FileSidecar};
use vaultkeeper_entity::protection::{CopyLocation, ProtectionRecord, ProtectionStatus};
use vaultkeeper_storage::atomic::write_json_atomic;
use vaultkeeper_storage::checksum::crc32;
use vaultkeeper_storage::providers::local::mime_from_path;
use vaultkeeper_storage::{StorageManager, tree};

use super::manifest::ProtectionManifest;
use crate::guard::OperationGuard;
use crate::naming;
use crate::retention::RetentionRegistry;

/// Copies written by every protection cycle.
const REDUNDANT_COPIES: usize = 3;

/// Outcome of a verification pass over the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Records checked.
    pub checked: usize,
    /// Records with at least one healthy copy.
    pub verified_count: usize,
    /// Records with no healthy copy.
    pub missing_count: usize,
    /// Verified records that lost some of their copies.
    pub degraded_count: usize,
    /// Owner ids whose records are lost.
    pub lost: Vec<String>,
    /// When the pass ran.
    pub verified_at: DateTime<Utc>,
}

/// Outcome of an emergency backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyBackupReport {
    /// Directory the backup was written to.
    pub directory: PathBuf,
    /// Files copied per category.
    pub copied: BTreeMap<String, usize>,
    /// Bytes copied.
    pub bytes: u64,
    /// Registered files whose primary was missing.
    pub skipped: Vec<String>,
    /// Older emergency directories removed by retention.
    pub pruned: Vec<String>,
}

/// `manifest.json` written into each emergency backup directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmergencyManifest {
    created_at: DateTime<Utc>,
    files: Vec<EmergencyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmergencyEntry {
    path: String,
    stored_name: String,
    original_name: String,
    category: FileCategory,
    size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner_id: Option<String>,
}

/// Keeps three independent copies of every protected file and restores
/// from whichever copy survives.
#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    /// Namespace routing for the content, protection and backup stores.
    storage: StorageManager,
    /// Owner id → protection record.
    manifest: Arc<ProtectionManifest>,
    /// Primary artifact registry.
    registry: Arc<RetentionRegistry>,
    /// Serialises protection cycles with backups and restores.
    guard: OperationGuard,
    /// Versions area inside the backup namespace.
    versions_dir: String,
    /// Root of timestamped emergency backups.
    emergency_root: PathBuf,
    /// Emergency backups kept.
    emergency_retain: usize,
}

impl ProtectionEngine {
    /// Creates a new protection engine.
    pub fn new(
        storage: StorageManager,
        manifest: Arc<ProtectionManifest>,
        registry: Arc<RetentionRegistry>,
        guard: OperationGuard,
        config: &ProtectionConfig,
        emergency_root: PathBuf,
    ) -> Self {
        Self {
            storage,
            manifest,
            registry,
            guard,
            versions_dir: config.versions_dir.trim_matches('/').to_string(),
            emergency_root,
            emergency_retain: config.emergency_retain,
        }
    }

    /// Writes three redundant copies of `content` and records them.
    ///
    /// Each copy is attempted independently; the record lists only the
    /// copies that were written. Fails only when no copy could be written.
    pub async fn protect(
        &self,
        content: Bytes,
        owner_id: &str,
        owner_key: &str,
        original_filename: &str,
    ) -> AppResult<ProtectionRecord> {
        if content.is_empty() {
            return Err(AppError::validation(format!(
                "Refusing to protect empty file '{original_filename}' for owner {owner_id}"
            )));
        }

        let _permit = self.guard.begin("file protection").await?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
        let owner = naming::sanitize_component(owner_id);
        let key = naming::sanitize_component(owner_key);
        let name = naming::sanitize_component(original_filename);
        let version = Uuid::now_v7().simple().to_string();

        let targets: [(Namespace, String); REDUNDANT_COPIES] = [
            (Namespace::Protection, format!("{owner}-{stamp}-{name}")),
            (Namespace::Backup, format!("{key}-{stamp}-{name}")),
            (
                Namespace::Backup,
                format!("{}/{version}-{owner}-{name}", self.versions_dir),
            ),
        ];

        let mut copies = Vec::with_capacity(REDUNDANT_COPIES);
        for (namespace, path) in targets {
            match self.write_copy(namespace, &path, content.clone()).await {
                Ok(()) => copies.push(CopyLocation {
                    namespace,
                    path,
                    size_bytes: content.len() as u64,
                }),
                Err(e) => warn!(
                    kind = %ErrorKind::StorageWriteFailed,
                    owner_id,
                    namespace = %namespace,
                    path = %path,
                    error = %e,
                    "Failed to write protection copy"
                ),
            }
        }

        if copies.is_empty() {
            error!(owner_id, "Protection failed: no copy could be written");
            return Err(AppError::storage_write_failed(format!(
                "Protection failed for owner {owner_id}: no copy could be written"
            )));
        }

        let status = ProtectionStatus::from_counts(copies.len(), REDUNDANT_COPIES);
        let record = ProtectionRecord {
            owner_id: owner_id.to_string(),
            owner_key: owner_key.to_string(),
            original_filename: original_filename.to_string(),
            copies,
            checksum: crc32(&content),
            protected_at: Utc::now(),
            status,
            verified_at: None,
        };
        self.manifest.upsert(record.clone()).await?;

        info!(
            owner_id,
            copies = record.copies.len(),
            size = content.len(),
            "File protected"
        );
        Ok(record)
    }

    /// Copies the first healthy copy back into the content store under a
    /// fresh name and returns that name.
    pub async fn restore(&self, owner_id: &str) -> AppResult<String> {
        let _permit = self.guard.begin("file restore").await?;
        self.manifest.refresh().await?;
        self.registry.refresh().await?;

        let record = self.manifest.get(owner_id).await.ok_or_else(|| {
            AppError::restore_not_found(format!("No protection record for owner {owner_id}"))
        })?;

        let mut source = None;
        for copy in &record.copies {
            if let Some(data) = self.read_healthy(copy, record.checksum).await {
                source = Some((copy, data));
                break;
            }
        }
        let Some((copy, data)) = source else {
            error!(
                kind = %ErrorKind::IntegrityLost,
                owner_id,
                copies = record.copies.len(),
                "No healthy copy left to restore from"
            );
            return Err(AppError::restore_not_found(format!(
                "No healthy copy to restore for owner {owner_id}"
            )));
        };

        let content = self.storage.content().await?;
        let stored_name = naming::stored_name("restored", owner_id, &record.original_filename);
        content.write_new(&stored_name, data.clone()).await?;

        let previous = self.registry.latest_for_owner(owner_id).await;
        let mime_type = previous
            .as_ref()
            .map(|p| p.mime_type.clone())
            .or_else(|| mime_from_path(&record.original_filename))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let now = Utc::now();

        let sidecar = FileSidecar {
            owner_id: owner_id.to_string(),
            original_name: record.original_filename.clone(),
            uploaded_at: now,
            size_bytes: data.len() as u64,
            mime_type: mime_type.clone(),
        };
        content
            .write(
                &FileSidecar::path_for(&stored_name),
                Bytes::from(serde_json::to_vec_pretty(&sidecar)?),
            )
            .await?;

        self.registry
            .register(FileMetadata {
                stored_name: stored_name.clone(),
                original_name: record.original_filename.clone(),
                category: previous
                    .map(|p| p.category)
                    .unwrap_or(FileCategory::AttachmentCv),
                size_bytes: data.len() as u64,
                mime_type,
                registered_at: now,
                owner_id: Some(owner_id.to_string()),
                checksum: Some(record.checksum),
            })
            .await?;

        info!(owner_id, from = %copy, to = %stored_name, "File restored from protection copy");
        Ok(stored_name)
    }

    /// Protection records, sorted by owner.
    pub async fn records(&self) -> Vec<ProtectionRecord> {
        self.manifest.records().await
    }

    /// Checks every copy of every record and updates record statuses.
    pub async fn verify(&self) -> AppResult<VerificationReport> {
        self.manifest.refresh().await?;
        let records = self.manifest.records().await;
        let verified_at = Utc::now();
        let mut report = VerificationReport {
            checked: records.len(),
            verified_count: 0,
            missing_count: 0,
            degraded_count: 0,
            lost: Vec::new(),
            verified_at,
        };

        let mut updated = Vec::with_capacity(records.len());
        for mut record in records {
            let mut healthy = 0;
            for copy in &record.copies {
                if self.read_healthy(copy, record.checksum).await.is_some() {
                    healthy += 1;
                }
            }

            record.status = ProtectionStatus::from_counts(healthy, REDUNDANT_COPIES);
            record.verified_at = Some(verified_at);
            match record.status {
                ProtectionStatus::Protected => report.verified_count += 1,
                ProtectionStatus::Degraded => {
                    report.verified_count += 1;
                    report.degraded_count += 1;
                    warn!(
                        owner_id = %record.owner_id,
                        healthy,
                        copies = record.copies.len(),
                        "Protected file lost some copies"
                    );
                }
                ProtectionStatus::Lost => {
                    report.missing_count += 1;
                    report.lost.push(record.owner_id.clone());
                    error!(
                        kind = %ErrorKind::IntegrityLost,
                        owner_id = %record.owner_id,
                        "Protected file has no surviving copy"
                    );
                }
            }
            updated.push(record);
        }

        self.manifest.upsert_many(updated).await?;

        info!(
            checked = report.checked,
            verified = report.verified_count,
            degraded = report.degraded_count,
            missing = report.missing_count,
            "Protection verification complete"
        );
        Ok(report)
    }

    /// Copies every registered primary of a known category into a new
    /// timestamped emergency directory, then prunes old ones.
    pub async fn emergency_backup(&self) -> AppResult<EmergencyBackupReport> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let directory = self.emergency_root.join(&stamp);
        fs::create_dir_all(&directory).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create emergency directory: {}", directory.display()),
                e,
            )
        })?;

        let content = self.storage.content().await?;
        let mut report = EmergencyBackupReport {
            directory: directory.clone(),
            copied: BTreeMap::new(),
            bytes: 0,
            skipped: Vec::new(),
            pruned: Vec::new(),
        };
        let mut manifest = EmergencyManifest {
            created_at: Utc::now(),
            files: Vec::new(),
        };

        self.registry.refresh().await?;
        for entry in self.registry.entries().await {
            if !entry.category.is_known() {
                continue;
            }
            let data = match content.read_bytes(&entry.stored_name).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => {
                    report.skipped.push(entry.stored_name.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let relative = format!("{}/{}", entry.category, entry.stored_name);
            let target = directory.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, &data).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageWriteFailed,
                    format!("Failed to write emergency copy: {}", target.display()),
                    e,
                )
            })?;

            *report.copied.entry(entry.category.to_string()).or_default() += 1;
            report.bytes += data.len() as u64;
            manifest.files.push(EmergencyEntry {
                path: relative,
                stored_name: entry.stored_name,
                original_name: entry.original_name,
                category: entry.category,
                size_bytes: data.len() as u64,
                owner_id: entry.owner_id,
            });
        }

        write_json_atomic(&directory.join("manifest.json"), &manifest).await?;
        report.pruned = self.prune_emergency().await?;

        if !report.skipped.is_empty() {
            warn!(
                skipped = report.skipped.len(),
                "Emergency backup skipped registered files missing from the primary store"
            );
        }
        info!(
            directory = %directory.display(),
            files = manifest.files.len(),
            bytes = report.bytes,
            "Emergency backup complete"
        );
        Ok(report)
    }

    /// Removes emergency directories beyond the retention count, oldest first.
    async fn prune_emergency(&self) -> AppResult<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.emergency_root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let excess = names.len().saturating_sub(self.emergency_retain);
        let pruned: Vec<String> = names.into_iter().take(excess).collect();
        for name in &pruned {
            tree::remove_tree(&self.emergency_root.join(name)).await?;
        }
        Ok(pruned)
    }

    async fn write_copy(&self, namespace: Namespace, path: &str, data: Bytes) -> AppResult<()> {
        let provider = self.storage.get(namespace).await?;
        provider.write(path, data).await
    }

    /// Reads a copy and returns its bytes only if it is non-empty and
    /// matches the recorded checksum.
    async fn read_healthy(&self, copy: &CopyLocation, checksum: u32) -> Option<Bytes> {
        let provider = match self.storage.get(copy.namespace).await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(copy = %copy, error = %e, "No provider for protection copy");
                return None;
            }
        };
        match provider.read_bytes(&copy.path).await {
            Ok(data) if data.is_empty() => {
                warn!(copy = %copy, "Protection copy is empty");
                None
            }
            Ok(data) if crc32(&data) != checksum => {
                warn!(copy = %copy, "Protection copy failed checksum");
                None
            }
            Ok(data) => Some(data),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vaultkeeper_storage::LocalStorageProvider;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        engine: ProtectionEngine,
        registry: Arc<RetentionRegistry>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let storage = StorageManager::new();
        let content = Arc::new(LocalStorageProvider::new(root.join("content-store")).await.unwrap());
        storage.register(Namespace::Content, content.clone()).await;
        storage
            .register(
                Namespace::Protection,
                Arc::new(LocalStorageProvider::new(root.join("protection-store")).await.unwrap()),
            )
            .await;
        storage
            .register(
                Namespace::Backup,
                Arc::new(LocalStorageProvider::new(root.join("backup-store")).await.unwrap()),
            )
            .await;

        let manifest = Arc::new(
            ProtectionManifest::load(root.join("registry/protection-manifest.json"))
                .await
                .unwrap(),
        );
        let registry = Arc::new(
            RetentionRegistry::load(root.join("registry/file-registry.json"), content)
                .await
                .unwrap(),
        );
        let engine = ProtectionEngine::new(
            storage,
            manifest,
            registry.clone(),
            OperationGuard::new(),
            &ProtectionConfig::default(),
            root.join("emergency"),
        );
        Fixture {
            _dir: dir,
            root,
            engine,
            registry,
        }
    }

    fn copy_path(root: &Path, copy: &CopyLocation) -> PathBuf {
        let base = match copy.namespace {
            Namespace::Content => "content-store",
            Namespace::Protection => "protection-store",
            Namespace::Backup => "backup-store",
        };
        root.join(base).join(&copy.path)
    }

    #[tokio::test]
    async fn test_protect_writes_three_copies_and_verifies() {
        let fx = fixture().await;
        let record = fx
            .engine
            .protect(Bytes::from_static(b"%PDF-1.7"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap();

        assert_eq!(record.copies.len(), 3);
        assert!(record.copies[0].path.starts_with("42-"));
        assert!(record.copies[1].path.starts_with("a@x.com-"));
        assert!(record.copies[2].path.starts_with("versions/"));
        for copy in &record.copies {
            assert_eq!(std::fs::read(copy_path(&fx.root, copy)).unwrap(), b"%PDF-1.7");
        }

        let report = fx.engine.verify().await.unwrap();
        assert_eq!(report.verified_count, 1);
        assert_eq!(report.missing_count, 0);
    }

    /// Replaces a storage directory with a regular file so writes below it
    /// fail.
    fn block_dir(path: &Path) {
        let _ = std::fs::remove_dir_all(path);
        std::fs::write(path, b"not a directory").unwrap();
    }

    #[tokio::test]
    async fn test_failed_copy_is_left_out_and_record_degraded() {
        let fx = fixture().await;
        block_dir(&fx.root.join("backup-store/versions"));

        let record = fx
            .engine
            .protect(Bytes::from_static(b"%PDF-1.7"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap();

        assert_eq!(record.copies.len(), 2);
        assert!(record.copies.iter().all(|c| !c.path.starts_with("versions/")));
        assert_eq!(record.status, ProtectionStatus::Degraded);
        for copy in &record.copies {
            assert!(copy_path(&fx.root, copy).is_file());
        }
    }

    #[tokio::test]
    async fn test_unwritable_backup_root_keeps_protection_copy() {
        let fx = fixture().await;
        block_dir(&fx.root.join("backup-store"));

        let record = fx
            .engine
            .protect(Bytes::from_static(b"%PDF-1.7"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap();

        assert_eq!(record.copies.len(), 1);
        assert_eq!(record.copies[0].namespace, Namespace::Protection);
        assert_eq!(record.status, ProtectionStatus::Degraded);
    }

    #[tokio::test]
    async fn test_no_copy_written_fails_without_manifest_entry() {
        let fx = fixture().await;
        block_dir(&fx.root.join("protection-store"));
        block_dir(&fx.root.join("backup-store"));

        let err = fx
            .engine
            .protect(Bytes::from_static(b"%PDF-1.7"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::StorageWriteFailed);
        assert!(fx.engine.records().await.is_empty());
        assert!(!fx.root.join("registry/protection-manifest.json").exists());
    }

    #[tokio::test]
    async fn test_single_copy_loss_is_tolerated() {
        let fx = fixture().await;
        let record = fx
            .engine
            .protect(Bytes::from_static(b"cv"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap();

        std::fs::remove_file(copy_path(&fx.root, &record.copies[1])).unwrap();
        let report = fx.engine.verify().await.unwrap();
        assert_eq!(report.verified_count, 1);
        assert_eq!(report.degraded_count, 1);

        for copy in &record.copies {
            let _ = std::fs::remove_file(copy_path(&fx.root, copy));
        }
        let report = fx.engine.verify().await.unwrap();
        assert_eq!(report.verified_count, 0);
        assert_eq!(report.missing_count, 1);
        assert_eq!(report.lost, vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupted_copy_is_not_healthy() {
        let fx = fixture().await;
        let record = fx
            .engine
            .protect(Bytes::from_static(b"original"), "9", "b@x.com", "b.pdf")
            .await
            .unwrap();

        // Same size, different bytes.
        std::fs::write(copy_path(&fx.root, &record.copies[0]), b"tampered").unwrap();
        let report = fx.engine.verify().await.unwrap();
        assert_eq!(report.degraded_count, 1);

        let restored = fx.engine.restore("9").await.unwrap();
        let bytes = std::fs::read(fx.root.join("content-store").join(&restored)).unwrap();
        assert_eq!(bytes, b"original");
    }

    #[tokio::test]
    async fn test_restore_without_copies_creates_nothing() {
        let fx = fixture().await;
        let record = fx
            .engine
            .protect(Bytes::from_static(b"cv"), "42", "a@x.com", "a.pdf")
            .await
            .unwrap();
        for copy in &record.copies {
            std::fs::remove_file(copy_path(&fx.root, copy)).unwrap();
        }

        let err = fx.engine.restore("42").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RestoreNotFound);
        assert_eq!(
            std::fs::read_dir(fx.root.join("content-store")).unwrap().count(),
            0
        );

        let err = fx.engine.restore("unknown").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RestoreNotFound);
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .engine
            .protect(Bytes::new(), "42", "a@x.com", "a.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_emergency_backup_copies_known_categories() {
        let fx = fixture().await;
        let content_root = fx.root.join("content-store");
        std::fs::write(content_root.join("cv-1.pdf"), b"cv").unwrap();
        std::fs::write(content_root.join("logo.png"), b"png").unwrap();
        std::fs::write(content_root.join("notes.txt"), b"txt").unwrap();

        for (name, category) in [
            ("cv-1.pdf", FileCategory::AttachmentCv),
            ("logo.png", FileCategory::Image),
            ("notes.txt", FileCategory::Other),
            ("gone.pdf", FileCategory::AttachmentCv),
        ] {
            fx.registry
                .register(FileMetadata {
                    stored_name: name.to_string(),
                    original_name: name.to_string(),
                    category,
                    size_bytes: 3,
                    mime_type: "application/octet-stream".to_string(),
                    registered_at: Utc::now(),
                    owner_id: None,
                    checksum: None,
                })
                .await
                .unwrap();
        }

        let report = fx.engine.emergency_backup().await.unwrap();
        assert_eq!(report.copied.get("attachment-cv"), Some(&1));
        assert_eq!(report.copied.get("image"), Some(&1));
        assert!(!report.copied.contains_key("other"));
        assert_eq!(report.skipped, vec!["gone.pdf".to_string()]);
        assert!(report.directory.join("attachment-cv/cv-1.pdf").is_file());
        assert!(report.directory.join("manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_emergency_backups_are_pruned() {
        let fx = fixture().await;
        for _ in 0..7 {
            fx.engine.emergency_backup().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let kept = std::fs::read_dir(fx.root.join("emergency")).unwrap().count();
        assert_eq!(kept, 5);
    }
}
