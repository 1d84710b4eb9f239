//! Retention registry: the log of artifacts in the primary content store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::storage::StorageProvider;
use vaultkeeper_entity::file::FileMetadata;
use vaultkeeper_storage::atomic::{read_json_optional, write_atomic, write_json_atomic};
use vaultkeeper_storage::lock::{FileLock, lock_path_for};

/// Text written to `RETENTION_POLICY.md` in the data root.
const RETENTION_POLICY: &str = "\
# Retention policy

Files under this directory are business records. Do not delete them by hand.

- `content-store/` holds the primary copy of every uploaded artifact.
- `protection-store/` and `backup-store/` hold redundant copies and are
  restored from automatically when a primary goes missing.
- `snapshots/` and `disaster-recovery/` hold scheduled backups and are
  pruned by the backup engines, never manually.
";

/// Result of comparing the registry with the primary store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityAudit {
    /// Registered entries.
    pub total: usize,
    /// Entries whose primary file exists.
    pub present: usize,
    /// Stored names whose primary file is gone.
    pub missing: Vec<String>,
}

/// Append-only registry of stored artifacts.
///
/// Entries are cached in memory. Every append re-reads the file under a
/// sibling `.lock` file, so processes sharing the data root never drop
/// each other's entries.
#[derive(Debug)]
pub struct RetentionRegistry {
    /// Registry file.
    path: PathBuf,
    /// Lock file held across each read-modify-write of `path`.
    lock_path: PathBuf,
    /// Primary content store.
    content: Arc<dyn StorageProvider>,
    /// Entries in registration order.
    entries: RwLock<Vec<FileMetadata>>,
}

impl RetentionRegistry {
    /// Loads the registry from `path`, starting empty if it does not exist.
    pub async fn load(path: impl Into<PathBuf>, content: Arc<dyn StorageProvider>) -> AppResult<Self> {
        let path = path.into();
        let entries: Vec<FileMetadata> = read_json_optional(&path).await?.unwrap_or_default();
        info!(path = %path.display(), entries = entries.len(), "Loaded file registry");
        Ok(Self {
            lock_path: lock_path_for(&path),
            path,
            content,
            entries: RwLock::new(entries),
        })
    }

    /// Appends an entry and persists the registry.
    pub async fn register(&self, metadata: FileMetadata) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        let _lock = FileLock::acquire(&self.lock_path).await?;
        let mut next: Vec<FileMetadata> = read_json_optional(&self.path).await?.unwrap_or_default();
        next.push(metadata);
        write_json_atomic(&self.path, &next).await?;
        *entries = next;
        Ok(())
    }

    /// Reloads entries appended by other processes.
    pub async fn refresh(&self) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        if let Some(on_disk) = read_json_optional(&self.path).await? {
            *entries = on_disk;
        }
        Ok(())
    }

    /// Snapshot of every entry in registration order.
    pub async fn entries(&self) -> Vec<FileMetadata> {
        self.entries.read().await.clone()
    }

    /// Newest entry registered for an owner.
    pub async fn latest_for_owner(&self, owner_id: &str) -> Option<FileMetadata> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .find(|e| e.owner_id.as_deref() == Some(owner_id))
            .cloned()
    }

    /// Checks that every registered file still exists in the primary store.
    pub async fn audit_integrity(&self) -> AppResult<IntegrityAudit> {
        self.refresh().await?;
        let entries = self.entries().await;
        let mut audit = IntegrityAudit {
            total: entries.len(),
            ..Default::default()
        };

        for entry in &entries {
            if self.content.exists(&entry.stored_name).await? {
                audit.present += 1;
            } else {
                audit.missing.push(entry.stored_name.clone());
            }
        }

        if audit.missing.is_empty() {
            info!(total = audit.total, "Registry audit found every primary file");
        } else {
            warn!(
                total = audit.total,
                missing = audit.missing.len(),
                "Registry audit found missing primary files"
            );
        }
        Ok(audit)
    }

    /// Writes the retention policy note and `.keep` markers.
    ///
    /// The markers only document intent; nothing reads them.
    pub async fn install_policy_markers(
        &self,
        data_root: &Path,
        redundancy_dirs: &[PathBuf],
    ) -> AppResult<()> {
        write_atomic(&data_root.join("RETENTION_POLICY.md"), RETENTION_POLICY.as_bytes()).await?;

        for dir in redundancy_dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageWriteFailed,
                    format!("Failed to create {}", dir.display()),
                    e,
                )
            })?;
            let marker = dir.join(".keep");
            if !marker.exists() {
                fs::write(&marker, b"").await?;
            }
        }
        Ok(())
    }
}
