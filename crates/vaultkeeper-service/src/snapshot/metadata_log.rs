//! Capped metadata log of snapshot runs.

use std::path::PathBuf;

use tokio::sync::RwLock;

use vaultkeeper_core::result::AppResult;
use vaultkeeper_entity::snapshot::Snapshot;
use vaultkeeper_storage::atomic::{read_json_optional, write_json_atomic};

/// Snapshot entries in chronological order, persisted as one JSON array.
#[derive(Debug)]
pub struct SnapshotLog {
    /// `metadata-log.json`.
    path: PathBuf,
    /// Maximum entries kept; the oldest are evicted first.
    cap: usize,
    entries: RwLock<Vec<Snapshot>>,
}

impl SnapshotLog {
    /// Loads the log, starting empty if it does not exist.
    pub async fn load(path: impl Into<PathBuf>, cap: usize) -> AppResult<Self> {
        let path = path.into();
        let mut entries: Vec<Snapshot> = read_json_optional(&path).await?.unwrap_or_default();
        sort_chronological(&mut entries);
        Ok(Self {
            path,
            cap: cap.max(1),
            entries: RwLock::new(entries),
        })
    }

    /// Appends an entry, evicting the oldest beyond the cap.
    ///
    /// Returns the evicted entries.
    pub async fn append(&self, snapshot: Snapshot) -> AppResult<Vec<Snapshot>> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.push(snapshot);
        sort_chronological(&mut next);
        let excess = next.len().saturating_sub(self.cap);
        let evicted: Vec<Snapshot> = next.drain(..excess).collect();

        write_json_atomic(&self.path, &next).await?;
        *entries = next;
        Ok(evicted)
    }

    /// Replaces every entry.
    pub async fn replace(&self, mut snapshots: Vec<Snapshot>) -> AppResult<()> {
        sort_chronological(&mut snapshots);
        let mut entries = self.entries.write().await;
        write_json_atomic(&self.path, &snapshots).await?;
        *entries = snapshots;
        Ok(())
    }

    /// Every entry, newest first.
    pub async fn newest_first(&self) -> Vec<Snapshot> {
        let mut entries = self.entries.read().await.clone();
        entries.reverse();
        entries
    }

    /// Entry with the given id.
    pub async fn find(&self, id: &str) -> Option<Snapshot> {
        self.entries.read().await.iter().find(|s| s.id == id).cloned()
    }

    /// Newest completed entry.
    pub async fn latest_completed(&self) -> Option<Snapshot> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.is_completed())
            .cloned()
    }
}

fn sort_chronological(entries: &mut [Snapshot]) {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}
