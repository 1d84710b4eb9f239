//! CV file assignment: naming, storing, self-healing reads and sidecar
//! verification.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_entity::file::{FileCategory, FileMetadata, FileSidecar};
use vaultkeeper_entity::protection::ProtectionRecord;
use vaultkeeper_storage::StorageManager;
use vaultkeeper_storage::checksum::crc32;
use vaultkeeper_storage::providers::local::mime_from_path;

use crate::naming;
use crate::protection::ProtectionEngine;
use crate::retention::RetentionRegistry;

/// A CV upload handed over by the application.
#[derive(Debug, Clone)]
pub struct CvUpload {
    /// Owning CV record id.
    pub owner_id: String,
    /// Owner contact key (email).
    pub owner_key: String,
    /// File name as uploaded.
    pub original_name: String,
    /// MIME type, guessed from the name when absent.
    pub mime_type: Option<String>,
    /// File content.
    pub data: Bytes,
}

/// Result of storing an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    /// Name of the primary file in the content store.
    pub stored_name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// CRC32 of the content.
    pub checksum: u32,
    /// Redundant copies, absent when protection failed.
    pub protection: Option<ProtectionRecord>,
}

/// File content returned by a read.
#[derive(Debug, Clone)]
pub struct RecoveredFile {
    /// Name the content was read from. Differs from the requested name
    /// when the file was restored.
    pub stored_name: String,
    /// File content.
    pub data: Bytes,
    /// Whether the primary was missing and had to be restored.
    pub restored: bool,
}

/// A stored name the application expects to exist for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedAssignment {
    /// Owning record id.
    pub owner_id: String,
    /// Stored name recorded by the application.
    pub stored_name: String,
}

/// Mismatches between the content store and the application's records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentReport {
    /// Files checked in the content store.
    pub checked: usize,
    /// Files with no sidecar or whose sidecar owner is not expected.
    pub orphans: Vec<String>,
    /// Expected files absent from the content store.
    pub missing: Vec<ExpectedAssignment>,
}

/// Assigns stored names to CV uploads and keeps them readable.
#[derive(Debug, Clone)]
pub struct AssignmentService {
    /// Content store routing.
    storage: StorageManager,
    /// Primary artifact registry.
    registry: Arc<RetentionRegistry>,
    /// Redundant copy protection.
    protection: Arc<ProtectionEngine>,
    /// Upload size limit.
    max_upload_size_bytes: u64,
}

impl AssignmentService {
    /// Creates a new assignment service.
    pub fn new(
        storage: StorageManager,
        registry: Arc<RetentionRegistry>,
        protection: Arc<ProtectionEngine>,
        max_upload_size_bytes: u64,
    ) -> Self {
        Self {
            storage,
            registry,
            protection,
            max_upload_size_bytes,
        }
    }

    /// Generates a collision-free stored name for a CV.
    pub fn generate_stored_name(&self, owner_id: &str, original_name: &str) -> String {
        naming::stored_name("cv", owner_id, original_name)
    }

    /// Writes the primary file and its sidecar, registers it and protects it.
    pub async fn store(&self, upload: CvUpload) -> AppResult<StoredFile> {
        if upload.data.is_empty() {
            return Err(AppError::validation("Uploaded file is empty"));
        }
        if upload.data.len() as u64 > self.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "File exceeds maximum upload size of {} bytes",
                self.max_upload_size_bytes
            )));
        }

        let content = self.storage.content().await?;
        let stored_name = self.generate_stored_name(&upload.owner_id, &upload.original_name);
        let mime_type = upload
            .mime_type
            .clone()
            .or_else(|| mime_from_path(&upload.original_name))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size_bytes = upload.data.len() as u64;
        let checksum = crc32(&upload.data);
        let now = Utc::now();

        content.write_new(&stored_name, upload.data.clone()).await?;

        let sidecar = FileSidecar {
            owner_id: upload.owner_id.clone(),
            original_name: upload.original_name.clone(),
            uploaded_at: now,
            size_bytes,
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
                original_name: upload.original_name.clone(),
                category: FileCategory::AttachmentCv,
                size_bytes,
                mime_type,
                registered_at: now,
                owner_id: Some(upload.owner_id.clone()),
                checksum: Some(checksum),
            })
            .await?;

        let protection = match self
            .protection
            .protect(
                upload.data,
                &upload.owner_id,
                &upload.owner_key,
                &upload.original_name,
            )
            .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    owner_id = %upload.owner_id,
                    stored_name = %stored_name,
                    error = %e,
                    "CV stored without redundant copies"
                );
                None
            }
        };

        info!(owner_id = %upload.owner_id, stored_name = %stored_name, size_bytes, "CV stored");
        Ok(StoredFile {
            stored_name,
            size_bytes,
            checksum,
            protection,
        })
    }

    /// Reads a CV, restoring it from a protection copy when the primary is
    /// gone. Fails with not-found only when the restore also fails.
    ///
    /// A stale name whose owner already has a newer primary (an earlier
    /// restore, for one) is served that primary instead of restoring again.
    pub async fn read(&self, owner_id: &str, stored_name: &str) -> AppResult<RecoveredFile> {
        let content = self.storage.content().await?;
        match content.read_bytes(stored_name).await {
            Ok(data) => {
                return Ok(RecoveredFile {
                    stored_name: stored_name.to_string(),
                    data,
                    restored: false,
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.registry.refresh().await?;
        if let Some(latest) = self.registry.latest_for_owner(owner_id).await
            && latest.stored_name != stored_name
        {
            match content.read_bytes(&latest.stored_name).await {
                Ok(data) => {
                    info!(
                        owner_id,
                        stored_name,
                        current = %latest.stored_name,
                        "Serving current CV for a stale name"
                    );
                    return Ok(RecoveredFile {
                        stored_name: latest.stored_name,
                        data,
                        restored: true,
                    });
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        warn!(owner_id, stored_name, "Primary CV missing, restoring from protection copy");
        let restored_name = self.protection.restore(owner_id).await.map_err(|e| {
            AppError::not_found(format!(
                "CV '{stored_name}' for owner {owner_id} is missing and could not be restored: {}",
                e.message
            ))
        })?;

        let data = content.read_bytes(&restored_name).await?;
        Ok(RecoveredFile {
            stored_name: restored_name,
            data,
            restored: true,
        })
    }

    /// Compares the content store with the assignments the application
    /// expects, using sidecars as the only source of ownership.
    pub async fn verify_assignments(
        &self,
        expected: &[ExpectedAssignment],
    ) -> AppResult<AssignmentReport> {
        let content = self.storage.content().await?;
        let expected_owners: HashSet<&str> = expected.iter().map(|e| e.owner_id.as_str()).collect();

        let mut present = BTreeSet::new();
        let mut report = AssignmentReport::default();
        for object in content.list("").await? {
            let name = object.path;
            if object.is_directory || name.starts_with('.') || FileSidecar::is_sidecar(&name) {
                continue;
            }
            report.checked += 1;

            let owner = match content.read_bytes(&FileSidecar::path_for(&name)).await {
                Ok(raw) => match serde_json::from_slice::<FileSidecar>(&raw) {
                    Ok(sidecar) => Some(sidecar.owner_id),
                    Err(e) => {
                        warn!(stored_name = %name, error = %e, "Unreadable sidecar");
                        None
                    }
                },
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            if !owner.is_some_and(|o| expected_owners.contains(o.as_str())) {
                report.orphans.push(name.clone());
            }
            present.insert(name);
        }

        report.missing = expected
            .iter()
            .filter(|e| !present.contains(&e.stored_name))
            .cloned()
            .collect();

        if !report.orphans.is_empty() || !report.missing.is_empty() {
            warn!(
                orphans = report.orphans.len(),
                missing = report.missing.len(),
                "Assignment verification found mismatches"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkeeper_core::config::ProtectionConfig;
    use vaultkeeper_core::error::ErrorKind;
    use vaultkeeper_core::types::Namespace;
    use vaultkeeper_storage::LocalStorageProvider;

    use crate::guard::OperationGuard;
    use crate::protection::ProtectionManifest;

    async fn service(root: &std::path::Path) -> AssignmentService {
        let storage = StorageManager::new();
        let content = Arc::new(LocalStorageProvider::new(root.join("content-store")).await.unwrap());
        storage.register(Namespace::Content, content.clone()).await;
        for (ns, dir) in [
            (Namespace::Protection, "protection-store"),
            (Namespace::Backup, "backup-store"),
        ] {
            storage
                .register(ns, Arc::new(LocalStorageProvider::new(root.join(dir)).await.unwrap()))
                .await;
        }
        let registry = Arc::new(
            RetentionRegistry::load(root.join("registry/file-registry.json"), content)
                .await
                .unwrap(),
        );
        let manifest = Arc::new(
            ProtectionManifest::load(root.join("registry/protection-manifest.json"))
                .await
                .unwrap(),
        );
        let protection = Arc::new(ProtectionEngine::new(
            storage.clone(),
            manifest,
            registry.clone(),
            OperationGuard::new(),
            &ProtectionConfig::default(),
            root.join("emergency"),
        ));
        AssignmentService::new(storage, registry, protection, 1024)
    }

    fn upload(owner_id: &str, data: &'static [u8]) -> CvUpload {
        CvUpload {
            owner_id: owner_id.to_string(),
            owner_key: format!("{owner_id}@x.com"),
            original_name: "a.pdf".to_string(),
            mime_type: None,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_store_writes_primary_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let stored = svc.store(upload("42", b"%PDF")).await.unwrap();
        assert!(stored.stored_name.starts_with("cv-42-"));
        assert_eq!(stored.protection.as_ref().map(|p| p.copies.len()), Some(3));

        let content = dir.path().join("content-store");
        assert_eq!(std::fs::read(content.join(&stored.stored_name)).unwrap(), b"%PDF");
        let sidecar: FileSidecar = serde_json::from_slice(
            &std::fs::read(content.join(FileSidecar::path_for(&stored.stored_name))).unwrap(),
        )
        .unwrap();
        assert_eq!(sidecar.owner_id, "42");
        assert_eq!(sidecar.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_store_rejects_empty_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let err = svc.store(upload("1", b"")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let mut big = upload("1", b"");
        big.data = Bytes::from(vec![1u8; 2048]);
        let err = svc.store(big).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_read_self_heals_missing_primary() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let stored = svc.store(upload("42", b"%PDF")).await.unwrap();

        std::fs::remove_file(dir.path().join("content-store").join(&stored.stored_name)).unwrap();

        let recovered = svc.read("42", &stored.stored_name).await.unwrap();
        assert!(recovered.restored);
        assert_ne!(recovered.stored_name, stored.stored_name);
        assert_eq!(&recovered.data[..], b"%PDF");

        let again = svc.read("42", &recovered.stored_name).await.unwrap();
        assert!(!again.restored);
    }

    #[tokio::test]
    async fn test_repeated_stale_reads_restore_once() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let stored = svc.store(upload("42", b"%PDF")).await.unwrap();
        std::fs::remove_file(dir.path().join("content-store").join(&stored.stored_name)).unwrap();

        let first = svc.read("42", &stored.stored_name).await.unwrap();
        let second = svc.read("42", &stored.stored_name).await.unwrap();
        assert!(first.restored && second.restored);
        assert_eq!(first.stored_name, second.stored_name);
        assert_eq!(&second.data[..], b"%PDF");

        // The upload plus a single restore.
        assert_eq!(svc.registry.entries().await.len(), 2);
        let restored_files = std::fs::read_dir(dir.path().join("content-store"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with("restored-") && !FileSidecar::is_sidecar(&name)
            })
            .count();
        assert_eq!(restored_files, 1);
    }

    #[tokio::test]
    async fn test_read_unrecoverable_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let err = svc.read("404", "cv-404-missing.pdf").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_verify_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let kept = svc.store(upload("1", b"one")).await.unwrap();
        let stray = svc.store(upload("2", b"two")).await.unwrap();
        std::fs::write(dir.path().join("content-store/dropped.pdf"), b"x").unwrap();

        let expected = vec![
            ExpectedAssignment {
                owner_id: "1".to_string(),
                stored_name: kept.stored_name.clone(),
            },
            ExpectedAssignment {
                owner_id: "3".to_string(),
                stored_name: "cv-3-gone.pdf".to_string(),
            },
        ];
        let report = svc.verify_assignments(&expected).await.unwrap();

        assert_eq!(report.checked, 3);
        assert!(report.orphans.contains(&stray.stored_name));
        assert!(report.orphans.contains(&"dropped.pdf".to_string()));
        assert!(!report.orphans.contains(&kept.stored_name));
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].owner_id, "3");
    }
}
