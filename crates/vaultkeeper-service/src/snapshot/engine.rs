//! Directory snapshots: tables as JSON plus a copy of the content store.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info, warn};
use uuid::Uuid;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::{Record, RecordStore};
use vaultkeeper_core::types::format_bytes;
use vaultkeeper_entity::snapshot::{Snapshot, SnapshotStatus};
use vaultkeeper_storage::atomic::write_json_atomic;
use vaultkeeper_storage::tree;

use super::metadata_log::SnapshotLog;

/// Outcome of restoring a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRestoreReport {
    /// Snapshot restored.
    pub snapshot_id: String,
    /// Rows inserted per table.
    pub tables: BTreeMap<String, u64>,
    /// Tables that could not be parsed or imported.
    pub skipped_tables: Vec<String>,
    /// Files copied back into the content store.
    pub files_restored: u64,
    /// Where the previous content store was moved.
    pub previous_content: Option<PathBuf>,
}

/// Outcome of snapshot retention cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entries kept.
    pub retained: usize,
    /// Ids whose directories were removed.
    pub deleted: Vec<String>,
}

/// Takes, restores and prunes directory snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    /// Relational tables to export.
    records: Arc<dyn RecordStore>,
    /// Capped metadata log.
    log: Arc<SnapshotLog>,
    /// Directory holding one sub-directory per snapshot.
    root: PathBuf,
    /// Primary content store.
    content_root: PathBuf,
    /// Tables in dependency order.
    tables: Vec<String>,
    /// Completed snapshots kept by cleanup.
    retain_completed: usize,
}

impl SnapshotEngine {
    /// Creates a new snapshot engine.
    pub fn new(
        records: Arc<dyn RecordStore>,
        log: Arc<SnapshotLog>,
        root: PathBuf,
        content_root: PathBuf,
        tables: Vec<String>,
        retain_completed: usize,
    ) -> Self {
        Self {
            records,
            log,
            root,
            content_root,
            tables,
            retain_completed,
        }
    }

    /// Captures every table and the content store into a new snapshot.
    ///
    /// A table whose export fails is written empty and named in
    /// `failed_tables`. If the snapshot itself cannot be written, a failed
    /// entry is logged and the error returned.
    pub async fn create_backup(&self, description: &str) -> AppResult<Snapshot> {
        let timestamp = Utc::now();
        let mut snapshot = Snapshot {
            id: snapshot_id(timestamp),
            timestamp,
            description: description.to_string(),
            tables: self.tables.clone(),
            table_counts: BTreeMap::new(),
            failed_tables: Vec::new(),
            file_count: 0,
            size_bytes: 0,
            size_display: format_bytes(0),
            status: SnapshotStatus::Completed,
            error: None,
        };
        let dir = self.root.join(&snapshot.id);
        info!(id = %snapshot.id, description, "Snapshot backup started");

        let mut in_flight = InFlightSnapshot {
            snapshot: Some(snapshot.clone()),
            dir: dir.clone(),
            root: self.root.clone(),
            log: self.log.clone(),
        };
        let captured = self.capture(&dir, &mut snapshot).await;
        in_flight.snapshot = None;

        if let Err(e) = captured {
            error!(id = %snapshot.id, error = %e, "Snapshot backup failed");
            snapshot.status = SnapshotStatus::Failed;
            snapshot.error = Some(e.to_string());
            if let Err(cleanup) = tree::remove_tree(&dir).await {
                warn!(id = %snapshot.id, error = %cleanup, "Failed to remove partial snapshot");
            }
            if let Err(log_err) = self.record(snapshot).await {
                warn!(error = %log_err, "Failed to log failed snapshot");
            }
            return Err(e);
        }

        self.record(snapshot.clone()).await?;
        info!(
            id = %snapshot.id,
            files = snapshot.file_count,
            size = %snapshot.size_display,
            failed_tables = snapshot.failed_tables.len(),
            "Snapshot backup completed"
        );
        Ok(snapshot)
    }

    async fn capture(&self, dir: &Path, snapshot: &mut Snapshot) -> AppResult<()> {
        let tables_dir = dir.join("tables");
        fs::create_dir_all(&tables_dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create snapshot directory: {}", dir.display()),
                e,
            )
        })?;

        let previous = self.log.latest_completed().await;
        for table in &self.tables {
            let rows = match self.records.export_table(table).await {
                Ok(rows) => {
                    let had_rows = previous
                        .as_ref()
                        .and_then(|p| p.table_counts.get(table))
                        .copied()
                        .unwrap_or(0);
                    if rows.is_empty() && had_rows > 0 {
                        error!(
                            kind = %ErrorKind::IntegrityLost,
                            table = %table,
                            previous_rows = had_rows,
                            "Table is empty but the previous snapshot had rows"
                        );
                    }
                    rows
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Table export failed, writing it empty");
                    snapshot.failed_tables.push(table.clone());
                    Vec::new()
                }
            };
            snapshot.table_counts.insert(table.clone(), rows.len());
            write_json_atomic(&tables_dir.join(format!("{table}.json")), &rows).await?;
        }

        let copied = tree::copy_tree(&self.content_root, &dir.join("files")).await?;
        snapshot.file_count = copied.files;
        snapshot.size_bytes = tree::dir_size(dir).await?;
        snapshot.size_display = format_bytes(snapshot.size_bytes);

        write_json_atomic(&dir.join("snapshot.json"), &*snapshot).await
    }

    /// Appends to the log and removes directories the cap evicted.
    async fn record(&self, snapshot: Snapshot) -> AppResult<()> {
        for evicted in self.log.append(snapshot).await? {
            tree::remove_tree(&self.root.join(&evicted.id)).await?;
        }
        Ok(())
    }

    /// Imports a snapshot's tables and replaces the content store with its
    /// files.
    ///
    /// Tables are imported in dependency order; a table that fails is
    /// skipped. The live content store is moved aside, not deleted, and is
    /// moved back if the copy fails.
    pub async fn restore(&self, snapshot_id: &str) -> AppResult<SnapshotRestoreReport> {
        if snapshot_id.is_empty() || snapshot_id.contains(['/', '\\']) || snapshot_id.contains("..") {
            return Err(AppError::validation(format!("Invalid snapshot id: '{snapshot_id}'")));
        }
        if let Some(entry) = self.log.find(snapshot_id).await {
            if !entry.is_completed() {
                return Err(AppError::restore_not_found(format!(
                    "Snapshot {snapshot_id} did not complete"
                )));
            }
        }
        let dir = self.root.join(snapshot_id);
        if !dir.is_dir() {
            return Err(AppError::restore_not_found(format!(
                "Snapshot {snapshot_id} not found"
            )));
        }

        info!(id = snapshot_id, "Snapshot restore started");
        let mut report = SnapshotRestoreReport {
            snapshot_id: snapshot_id.to_string(),
            tables: BTreeMap::new(),
            skipped_tables: Vec::new(),
            files_restored: 0,
            previous_content: None,
        };

        for table in self.restore_order(&dir.join("tables")).await? {
            let path = dir.join("tables").join(format!("{table}.json"));
            match self.import_file(&table, &path).await {
                Ok(inserted) => {
                    report.tables.insert(table, inserted);
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Skipping table during snapshot restore");
                    report.skipped_tables.push(table);
                }
            }
        }

        let files = dir.join("files");
        if files.is_dir() {
            let suffix = format!("pre-restore-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
            let aside = tree::rename_aside(&self.content_root, &suffix).await?;
            match tree::copy_tree(&files, &self.content_root).await {
                Ok(copied) => report.files_restored = copied.files,
                Err(e) => {
                    error!(id = snapshot_id, error = %e, "File restore failed, putting previous content back");
                    tree::remove_tree(&self.content_root).await?;
                    if let Some(aside) = &aside {
                        fs::rename(aside, &self.content_root).await?;
                    }
                    return Err(e);
                }
            }
            report.previous_content = aside;
        } else {
            warn!(id = snapshot_id, "Snapshot has no files directory, content store left as is");
        }

        info!(
            id = snapshot_id,
            tables = report.tables.len(),
            skipped = report.skipped_tables.len(),
            files = report.files_restored,
            "Snapshot restore completed"
        );
        Ok(report)
    }

    /// Configured tables first, in dependency order, then any other table
    /// files alphabetically.
    async fn restore_order(&self, tables_dir: &Path) -> AppResult<Vec<String>> {
        let mut found = Vec::new();
        if tables_dir.is_dir() {
            let mut entries = fs::read_dir(tables_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(table) = name.strip_suffix(".json") {
                    found.push(table.to_string());
                }
            }
        }
        found.sort();

        let mut order: Vec<String> = self
            .tables
            .iter()
            .filter(|t| found.contains(t))
            .cloned()
            .collect();
        order.extend(found.into_iter().filter(|t| !self.tables.contains(t)));
        Ok(order)
    }

    async fn import_file(&self, table: &str, path: &Path) -> AppResult<u64> {
        let raw = fs::read(path).await?;
        let rows: Vec<Record> = serde_json::from_slice(&raw)?;
        self.records.import_table(table, rows).await
    }

    /// Keeps the newest completed snapshots and deletes everything else.
    pub async fn clean_old_backups(&self) -> AppResult<CleanupReport> {
        let mut retained = Vec::new();
        let mut deleted = Vec::new();
        for entry in self.log.newest_first().await {
            if entry.is_completed() && retained.len() < self.retain_completed {
                retained.push(entry);
            } else {
                tree::remove_tree(&self.root.join(&entry.id)).await?;
                deleted.push(entry.id);
            }
        }

        // Directories no log entry refers to any more.
        let keep: HashSet<&str> = retained.iter().map(|s| s.id.as_str()).collect();
        if self.root.is_dir() {
            let mut entries = fs::read_dir(&self.root).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !keep.contains(name.as_str()) && !deleted.contains(&name) {
                    tree::remove_tree(&entry.path()).await?;
                    deleted.push(name);
                }
            }
        }

        let report = CleanupReport {
            retained: retained.len(),
            deleted,
        };
        self.log.replace(retained).await?;

        info!(
            retained = report.retained,
            deleted = report.deleted.len(),
            "Snapshot cleanup completed"
        );
        Ok(report)
    }

    /// Logged snapshots, newest first.
    pub async fn list_backups(&self) -> Vec<Snapshot> {
        self.log.newest_first().await
    }
}

/// Cleans up a snapshot whose capture was dropped before finishing, as
/// happens when a job times out.
///
/// The partial directory is removed synchronously and the failed entry is
/// logged from a spawned task.
struct InFlightSnapshot {
    /// Set while capture is running.
    snapshot: Option<Snapshot>,
    dir: PathBuf,
    root: PathBuf,
    log: Arc<SnapshotLog>,
}

impl Drop for InFlightSnapshot {
    fn drop(&mut self) {
        let Some(mut snapshot) = self.snapshot.take() else {
            return;
        };
        warn!(id = %snapshot.id, "Snapshot backup interrupted, removing partial snapshot");
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(id = %snapshot.id, error = %e, "Failed to remove partial snapshot");
        }

        snapshot.status = SnapshotStatus::Failed;
        snapshot.error = Some("Snapshot backup was interrupted".to_string());
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let log = self.log.clone();
        let root = self.root.clone();
        handle.spawn(async move {
            match log.append(snapshot).await {
                Ok(evicted) => {
                    for old in evicted {
                        if let Err(e) = tree::remove_tree(&root.join(&old.id)).await {
                            warn!(id = %old.id, error = %e, "Failed to remove evicted snapshot");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to log interrupted snapshot"),
            }
        });
    }
}

/// Sortable, unique snapshot id.
fn snapshot_id(timestamp: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "snapshot-{}-{}",
        timestamp.format("%Y%m%dT%H%M%S%3fZ"),
        &suffix[..8]
    )
}
