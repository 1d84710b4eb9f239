//! Disaster recovery: one self-contained artifact per backup and a staged,
//! destructive restore from it.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info, warn};
use uuid::Uuid;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::{RecordStore, TableData};
use vaultkeeper_entity::disaster::{DisasterListing, DisasterSnapshot, DisasterSummary};
use vaultkeeper_storage::atomic::{read_json_optional, write_json_atomic};
use vaultkeeper_storage::checksum::crc32;
use vaultkeeper_storage::tree;

use super::artifact::{self, ArtifactWriter};

/// Suffix of the summary written next to each artifact.
const SUMMARY_SUFFIX: &str = "-summary.json";

/// Outcome of a disaster-recovery restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisasterRestoreReport {
    /// Artifact restored.
    pub backup_id: String,
    /// Rows loaded per table.
    pub tables: BTreeMap<String, u64>,
    /// Tables left untouched.
    pub preserved_tables: Vec<String>,
    /// Rows inserted by the store.
    pub rows_restored: u64,
    /// Files now in the content store.
    pub files_restored: u64,
}

/// Outcome of disaster-recovery retention cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisasterCleanupReport {
    /// Artifacts kept.
    pub retained: usize,
    /// Ids removed.
    pub deleted: Vec<String>,
    /// Temp files left by interrupted backups, removed.
    #[serde(default)]
    pub stale_removed: Vec<String>,
}

/// Produces and restores complete, portable backups.
#[derive(Debug, Clone)]
pub struct DisasterRecoveryEngine {
    /// Relational tables.
    records: Arc<dyn RecordStore>,
    /// Directory holding artifacts and summaries.
    root: PathBuf,
    /// Primary content store.
    content_root: PathBuf,
    /// Tables in dependency order.
    tables: Vec<String>,
    /// Tables a restore never clears.
    preserved: Vec<String>,
    /// Artifacts kept by cleanup.
    retain: usize,
}

impl DisasterRecoveryEngine {
    /// Creates a new disaster-recovery engine.
    pub fn new(
        records: Arc<dyn RecordStore>,
        root: PathBuf,
        content_root: PathBuf,
        tables: Vec<String>,
        preserved: Vec<String>,
        retain: usize,
    ) -> Self {
        Self {
            records,
            root,
            content_root,
            tables,
            preserved,
            retain,
        }
    }

    /// Streams every table and every content file into a new artifact and
    /// writes its summary.
    pub async fn create_complete_backup(&self, description: &str) -> AppResult<DisasterSummary> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create {}", self.root.display()),
                e,
            )
        })?;

        let timestamp = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("dr-{}-{}", timestamp.format("%Y%m%dT%H%M%S%3fZ"), &suffix[..8]);
        info!(id = %id, description, "Disaster-recovery backup started");

        let mut writer =
            ArtifactWriter::create(self.artifact_path(&id), &id, timestamp, description).await?;
        if let Err(e) = self.stream_into(&mut writer).await {
            error!(id = %id, error = %e, "Disaster-recovery backup failed");
            drop(writer);
            return Err(e);
        }
        let summary = writer.finish().await?;
        write_json_atomic(&self.summary_path(&id), &summary).await?;

        info!(
            id = %id,
            records = summary.metadata.total_records,
            files = summary.metadata.total_files,
            size_estimate = summary.metadata.size_estimate,
            failed_tables = summary.metadata.failed_tables.len(),
            "Disaster-recovery backup completed"
        );
        Ok(summary)
    }

    async fn stream_into(&self, writer: &mut ArtifactWriter) -> AppResult<()> {
        for table in &self.tables {
            match self.records.export_table(table).await {
                Ok(rows) => writer.write_table(table, &rows).await?,
                Err(e) => {
                    warn!(table = %table, error = %e, "Table export failed, writing it empty");
                    writer.mark_failed(table);
                    writer.write_table(table, &[]).await?;
                }
            }
        }

        for entry in tree::walk_files(&self.content_root).await? {
            let data = fs::read(&entry.absolute).await?;
            writer.write_file(&entry.relative, &data).await?;
        }
        Ok(())
    }

    /// Replaces live tables and files with the artifact's contents.
    ///
    /// Every file is decoded and checksum-verified into a staging directory
    /// first; any failure there aborts before live data is touched. Tables
    /// other than the preserved ones are then replaced, and finally the
    /// staging directory is swapped in for the content store.
    pub async fn restore_from_backup(&self, backup_id: &str) -> AppResult<DisasterRestoreReport> {
        validate_id(backup_id)?;
        let snapshot = artifact::load(&self.artifact_path(backup_id)).await?;
        warn!(id = backup_id, "Destructive disaster-recovery restore started");

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let staging = sibling(&self.content_root, &format!("dr-staging-{stamp}"));
        let files_restored = match self.stage_files(&snapshot, &staging).await {
            Ok(count) => count,
            Err(e) => {
                error!(id = backup_id, error = %e, "Staging failed, nothing was changed");
                tree::remove_tree(&staging).await?;
                return Err(e);
            }
        };

        let (replacement, preserved_tables) = self.replacement_tables(snapshot);
        let tables: BTreeMap<String, u64> = replacement
            .iter()
            .map(|t| (t.name.clone(), t.records.len() as u64))
            .collect();
        let rows_restored = match self.records.replace_tables(replacement).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(id = backup_id, kind = %e.kind, error = %e, "Table restore failed");
                tree::remove_tree(&staging).await?;
                return Err(e);
            }
        };

        self.swap_in(&staging, &format!("dr-previous-{stamp}")).await?;

        info!(
            id = backup_id,
            tables = tables.len(),
            rows = rows_restored,
            files = files_restored,
            "Disaster-recovery restore completed"
        );
        Ok(DisasterRestoreReport {
            backup_id: backup_id.to_string(),
            tables,
            preserved_tables,
            rows_restored,
            files_restored,
        })
    }

    async fn stage_files(&self, snapshot: &DisasterSnapshot, staging: &Path) -> AppResult<u64> {
        fs::create_dir_all(staging).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create staging directory: {}", staging.display()),
                e,
            )
        })?;

        for (relative, encoded) in &snapshot.files {
            let target = staging.join(safe_relative(relative)?);
            let data = artifact::decode_file(encoded)?;
            if let Some(expected) = snapshot.checksums.get(relative) {
                if crc32(&data) != *expected {
                    return Err(AppError::integrity_lost(format!(
                        "Checksum mismatch for '{relative}' in backup {}",
                        snapshot.id
                    )));
                }
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, &data).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageWriteFailed,
                    format!("Failed to stage {relative}"),
                    e,
                )
            })?;
        }
        Ok(snapshot.files.len() as u64)
    }

    /// Non-preserved tables in dependency order: configured tables first,
    /// then any others alphabetically.
    fn replacement_tables(&self, snapshot: DisasterSnapshot) -> (Vec<TableData>, Vec<String>) {
        let mut remaining = snapshot.tables;
        let mut preserved = Vec::new();
        remaining.retain(|name, _| {
            let keep = !self.preserved.contains(name);
            if !keep {
                preserved.push(name.clone());
            }
            keep
        });

        let mut ordered = Vec::with_capacity(remaining.len());
        for table in &self.tables {
            if let Some(records) = remaining.remove(table) {
                ordered.push(TableData::new(table.clone(), records));
            }
        }
        ordered.extend(
            remaining
                .into_iter()
                .map(|(name, records)| TableData::new(name, records)),
        );
        (ordered, preserved)
    }

    async fn swap_in(&self, staging: &Path, aside_suffix: &str) -> AppResult<()> {
        let aside = tree::rename_aside(&self.content_root, aside_suffix).await?;
        if let Err(e) = fs::rename(staging, &self.content_root).await {
            error!(error = %e, "Failed to swap restored files into place");
            if let Some(aside) = &aside {
                fs::rename(aside, &self.content_root).await?;
            }
            return Err(AppError::with_source(
                ErrorKind::PartialRestore,
                "Tables were restored but files could not be swapped into place",
                e,
            ));
        }
        if let Some(aside) = aside {
            tree::remove_tree(&aside).await?;
        }
        Ok(())
    }

    /// Artifacts on disk, newest first. Unreadable entries are skipped.
    pub async fn list_backups(&self) -> AppResult<Vec<DisasterListing>> {
        let mut listings = Vec::new();
        for id in self.artifact_ids().await? {
            match self.summary(&id).await {
                Ok(summary) => listings.push(DisasterListing::from(summary)),
                Err(e) => warn!(id = %id, error = %e, "Skipping unreadable disaster-recovery backup"),
            }
        }
        listings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(listings)
    }

    /// Summary of one artifact, from its summary file or the artifact itself.
    ///
    /// A missing or unreadable summary file falls back to parsing the
    /// artifact.
    pub async fn summary(&self, backup_id: &str) -> AppResult<DisasterSummary> {
        validate_id(backup_id)?;
        match read_json_optional(&self.summary_path(backup_id)).await {
            Ok(Some(summary)) => return Ok(summary),
            Ok(None) => {}
            Err(e) => {
                warn!(id = %backup_id, error = %e, "Unreadable backup summary, reading the artifact");
            }
        }
        let snapshot = artifact::load(&self.artifact_path(backup_id)).await?;
        Ok(DisasterSummary::from_snapshot(&snapshot))
    }

    /// Keeps the newest artifacts and deletes the rest with their summaries.
    ///
    /// Also removes `*.tmp` files left by backups that were interrupted
    /// before finishing. Callers hold the operation guard, so no backup is
    /// writing one.
    pub async fn clean_old_backups(&self) -> AppResult<DisasterCleanupReport> {
        let stale_removed = self.remove_stale_temp_files().await?;
        let mut ids = self.artifact_ids().await?;
        ids.sort_by(|a, b| b.cmp(a));

        let deleted: Vec<String> = ids.iter().skip(self.retain).cloned().collect();
        for id in &deleted {
            for path in [self.artifact_path(id), self.summary_path(id)] {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let report = DisasterCleanupReport {
            retained: ids.len() - deleted.len(),
            deleted,
            stale_removed,
        };
        info!(
            retained = report.retained,
            deleted = report.deleted.len(),
            stale = report.stale_removed.len(),
            "Disaster-recovery cleanup completed"
        );
        Ok(report)
    }

    async fn remove_stale_temp_files(&self) -> AppResult<Vec<String>> {
        let mut removed = Vec::new();
        if !self.root.is_dir() {
            return Ok(removed);
        }
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".tmp") || !entry.file_type().await?.is_file() {
                continue;
            }
            fs::remove_file(entry.path()).await?;
            warn!(file = %name, "Removed temp file from an interrupted backup");
            removed.push(name);
        }
        removed.sort();
        Ok(removed)
    }

    async fn artifact_ids(&self) -> AppResult<Vec<String>> {
        let mut ids = Vec::new();
        if !self.root.is_dir() {
            return Ok(ids);
        }
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(SUMMARY_SUFFIX) {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    fn artifact_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn summary_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{SUMMARY_SUFFIX}"))
    }
}

fn validate_id(id: &str) -> AppResult<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(AppError::validation(format!("Invalid backup id: '{id}'")));
    }
    Ok(())
}

/// Relative path from an artifact, refusing anything that would leave the
/// staging directory.
fn safe_relative(relative: &str) -> AppResult<PathBuf> {
    let path = Path::new(relative);
    if relative.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(AppError::validation(format!(
            "Invalid file path in backup: '{relative}'"
        )));
    }
    Ok(path.to_path_buf())
}

/// Sibling of `path` named `<name>.<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use vaultkeeper_core::traits::record_store::Record;
    use vaultkeeper_database::MemoryRecordStore;

    const TABLES: [&str; 3] = ["whitelist", "jobs", "cvs"];

    struct Fixture {
        _dir: tempfile::TempDir,
        content: PathBuf,
        store: Arc<MemoryRecordStore>,
        engine: DisasterRecoveryEngine,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content-store");
        std::fs::create_dir_all(&content).unwrap();

        let store = Arc::new(MemoryRecordStore::new(TABLES).with_foreign_key("cvs", "jobs"));
        let engine = DisasterRecoveryEngine::new(
            store.clone(),
            dir.path().join("disaster-recovery"),
            content.clone(),
            TABLES.iter().map(|t| t.to_string()).collect(),
            vec!["whitelist".to_string()],
            5,
        );
        Fixture {
            _dir: dir,
            content,
            store,
            engine,
        }
    }

    async fn seed(fx: &Fixture) {
        fx.store
            .import_table("whitelist", vec![json!({"id": 1, "email": "admin@x.com"})])
            .await
            .unwrap();
        fx.store
            .import_table(
                "jobs",
                vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
            )
            .await
            .unwrap();
        fx.store
            .import_table(
                "cvs",
                vec![json!({"id": 1, "job_id": 1}), json!({"id": 2, "job_id": 2})],
            )
            .await
            .unwrap();
        std::fs::write(fx.content.join("cv-1.pdf"), b"%PDF-first").unwrap();
        std::fs::create_dir_all(fx.content.join("images")).unwrap();
        std::fs::write(fx.content.join("images/logo.png"), b"\x89PNG").unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_restores_records_and_files() {
        let fx = fixture().await;
        seed(&fx).await;
        let summary = fx.engine.create_complete_backup("nightly").await.unwrap();
        assert_eq!(summary.metadata.total_records, 6);
        assert_eq!(summary.metadata.total_files, 2);

        // Drift after the backup.
        fx.store.clear_table("cvs").await.unwrap();
        fx.store.import_table("jobs", vec![json!({"id": 4})]).await.unwrap();
        fx.store
            .import_table("whitelist", vec![json!({"id": 2, "email": "new@x.com"})])
            .await
            .unwrap();
        std::fs::remove_file(fx.content.join("cv-1.pdf")).unwrap();
        std::fs::write(fx.content.join("stray.pdf"), b"stray").unwrap();

        let report = fx.engine.restore_from_backup(&summary.id).await.unwrap();
        assert_eq!(report.preserved_tables, vec!["whitelist".to_string()]);
        assert_eq!(report.files_restored, 2);

        assert_eq!(fx.store.count("jobs").await.unwrap(), 3);
        assert_eq!(fx.store.count("cvs").await.unwrap(), 2);
        // Whitelist is never cleared by a restore.
        assert_eq!(fx.store.count("whitelist").await.unwrap(), 2);

        assert_eq!(std::fs::read(fx.content.join("cv-1.pdf")).unwrap(), b"%PDF-first");
        assert_eq!(std::fs::read(fx.content.join("images/logo.png")).unwrap(), b"\x89PNG");
        assert!(!fx.content.join("stray.pdf").exists());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_aborts_before_touching_live_data() {
        let fx = fixture().await;
        seed(&fx).await;
        let summary = fx.engine.create_complete_backup("nightly").await.unwrap();

        let path = fx.engine.artifact_path(&summary.id);
        let mut artifact: DisasterSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        // "aGVsbG8=" is "hello", which does not match the recorded checksum.
        artifact
            .files
            .insert("cv-1.pdf".to_string(), "aGVsbG8=".to_string());
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        fx.store.clear_table("cvs").await.unwrap();
        std::fs::write(fx.content.join("live.pdf"), b"live").unwrap();

        let err = fx.engine.restore_from_backup(&summary.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegrityLost);
        assert_eq!(fx.store.count("cvs").await.unwrap(), 0);
        assert!(fx.content.join("live.pdf").is_file());

        let leftovers: Vec<_> = std::fs::read_dir(fx.content.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("dr-staging"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_restore_unknown_backup() {
        let fx = fixture().await;
        let err = fx.engine.restore_from_backup("dr-missing").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RestoreNotFound);
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_and_orders_newest_first() {
        let fx = fixture().await;
        seed(&fx).await;
        let first = fx.engine.create_complete_backup("one").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = fx.engine.create_complete_backup("two").await.unwrap();

        // Summary removed: listing falls back to the artifact.
        std::fs::remove_file(fx.engine.summary_path(&first.id)).unwrap();
        std::fs::write(fx.engine.artifact_path("dr-corrupt"), b"{not json").unwrap();

        let listings = fx.engine.list_backups().await.unwrap();
        let ids: Vec<_> = listings.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(listings[1].metadata.total_files, 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest() {
        let fx = fixture().await;
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(fx.engine.create_complete_backup(&format!("run {i}")).await.unwrap().id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let report = fx.engine.clean_old_backups().await.unwrap();
        assert_eq!(report.retained, 5);
        assert_eq!(report.deleted.len(), 2);
        for id in &ids[..2] {
            assert!(!fx.engine.artifact_path(id).exists());
            assert!(!fx.engine.summary_path(id).exists());
        }
        assert_eq!(fx.engine.list_backups().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cleanup_removes_interrupted_temp_files() {
        let fx = fixture().await;
        let kept = fx.engine.create_complete_backup("kept").await.unwrap();
        std::fs::write(fx.engine.root.join("dr-interrupted.json.tmp"), b"{\"id\":").unwrap();

        let report = fx.engine.clean_old_backups().await.unwrap();
        assert_eq!(report.stale_removed, vec!["dr-interrupted.json.tmp".to_string()]);
        assert!(!fx.engine.root.join("dr-interrupted.json.tmp").exists());
        assert!(fx.engine.artifact_path(&kept.id).is_file());
    }

    #[derive(Debug)]
    struct StalledStore;

    #[async_trait::async_trait]
    impl RecordStore for StalledStore {
        async fn export_table(&self, _table: &str) -> AppResult<Vec<Record>> {
            std::future::pending().await
        }

        async fn import_table(
            &self,
            _table: &str,
            _records: Vec<Record>,
        ) -> AppResult<u64> {
            Ok(0)
        }

        async fn clear_table(&self, _table: &str) -> AppResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_timed_out_backup_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("disaster-recovery");
        let engine = DisasterRecoveryEngine::new(
            Arc::new(StalledStore),
            root.clone(),
            dir.path().join("content-store"),
            vec!["jobs".to_string()],
            Vec::new(),
            5,
        );

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), engine.create_complete_backup("nightly")).await;
        assert!(outcome.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_corrupt_summary_falls_back_to_artifact() {
        let fx = fixture().await;
        seed(&fx).await;
        let created = fx.engine.create_complete_backup("nightly").await.unwrap();
        std::fs::write(fx.engine.summary_path(&created.id), b"garbage").unwrap();

        let summary = fx.engine.summary(&created.id).await.unwrap();
        assert_eq!(summary.metadata.total_records, 6);
        assert_eq!(summary.metadata.total_files, 2);

        let listings = fx.engine.list_backups().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, created.id);
    }
}
