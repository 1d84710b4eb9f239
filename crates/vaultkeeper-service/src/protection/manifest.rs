//! Protection manifest: one record per owner, persisted as JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::info;

use vaultkeeper_core::result::AppResult;
use vaultkeeper_entity::protection::ProtectionRecord;
use vaultkeeper_storage::atomic::{read_json_optional, write_json_atomic};
use vaultkeeper_storage::lock::{FileLock, lock_path_for};

/// In-memory index of protection records backed by a JSON file.
///
/// Writers re-read the file under a sibling `.lock` file and hold both
/// locks across the write, so concurrent processes merge rather than
/// overwrite each other's records.
#[derive(Debug)]
pub struct ProtectionManifest {
    /// Manifest file.
    path: PathBuf,
    /// Lock file held across each read-modify-write of `path`.
    lock_path: PathBuf,
    /// Records keyed by owner id.
    records: RwLock<HashMap<String, ProtectionRecord>>,
}

impl ProtectionManifest {
    /// Loads the manifest, starting empty if the file does not exist.
    pub async fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let records = read_records(&path).await?;
        info!(path = %path.display(), records = records.len(), "Loaded protection manifest");
        Ok(Self {
            lock_path: lock_path_for(&path),
            path,
            records: RwLock::new(records),
        })
    }

    /// Reloads records written by other processes.
    pub async fn refresh(&self) -> AppResult<()> {
        let mut records = self.records.write().await;
        *records = read_records(&self.path).await?;
        Ok(())
    }

    /// Record for an owner.
    pub async fn get(&self, owner_id: &str) -> Option<ProtectionRecord> {
        self.records.read().await.get(owner_id).cloned()
    }

    /// Every record, ordered by owner id.
    pub async fn records(&self) -> Vec<ProtectionRecord> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        all
    }

    /// Inserts or replaces the record for its owner.
    pub async fn upsert(&self, record: ProtectionRecord) -> AppResult<()> {
        self.upsert_many(vec![record]).await
    }

    /// Inserts or replaces several records with a single write.
    pub async fn upsert_many(&self, updated: Vec<ProtectionRecord>) -> AppResult<()> {
        let mut records = self.records.write().await;
        let _lock = FileLock::acquire(&self.lock_path).await?;
        let mut next = read_records(&self.path).await?;
        for record in updated {
            next.insert(record.owner_id.clone(), record);
        }
        write_json_atomic(&self.path, &sorted(&next)).await?;
        *records = next;
        Ok(())
    }
}

async fn read_records(path: &Path) -> AppResult<HashMap<String, ProtectionRecord>> {
    let records: Vec<ProtectionRecord> = read_json_optional(path).await?.unwrap_or_default();
    Ok(records.into_iter().map(|r| (r.owner_id.clone(), r)).collect())
}

fn sorted(records: &HashMap<String, ProtectionRecord>) -> Vec<&ProtectionRecord> {
    let mut all: Vec<_> = records.values().collect();
    all.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
    all
}
