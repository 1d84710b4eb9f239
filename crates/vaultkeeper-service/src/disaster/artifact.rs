//! Streaming writer and loader for disaster-recovery artifacts.
//!
//! The artifact is one JSON object:
//! `{"id", "timestamp", "description", "tables", "files", "checksums", "metadata"}`.
//! Tables and files are written one at a time, so only a single table or
//! file is held in memory while the artifact is produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::Record;
use vaultkeeper_entity::disaster::{DisasterMetadata, DisasterSnapshot, DisasterSummary};
use vaultkeeper_storage::checksum::crc32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Tables,
    Files,
}

/// Temp file removed on drop unless it was moved into place.
///
/// Covers cancellation: a writer dropped mid-stream by a timed-out job
/// never reaches an async cleanup path.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!(path = %self.path.display(), "Removed partial artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial artifact"),
        }
    }
}

/// Writes an artifact to `<path>.tmp` and renames it into place on
/// [`finish`](Self::finish). Dropping the writer before that removes the
/// temp file.
#[derive(Debug)]
pub struct ArtifactWriter {
    out: BufWriter<File>,
    tmp: PartialFile,
    path: PathBuf,
    section: Section,
    first_in_section: bool,
    checksums: BTreeMap<String, u32>,
    summary: DisasterSummary,
}

impl ArtifactWriter {
    /// Opens the temp file and writes the artifact header.
    pub async fn create(
        path: PathBuf,
        id: &str,
        timestamp: DateTime<Utc>,
        description: &str,
    ) -> AppResult<Self> {
        let tmp = tmp_path(&path);
        let file = File::create(&tmp).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create artifact: {}", tmp.display()),
                e,
            )
        })?;

        let mut writer = Self {
            out: BufWriter::new(file),
            tmp: PartialFile {
                path: tmp,
                armed: true,
            },
            path,
            section: Section::Tables,
            first_in_section: true,
            checksums: BTreeMap::new(),
            summary: DisasterSummary {
                id: id.to_string(),
                timestamp,
                description: description.to_string(),
                tables: BTreeMap::new(),
                files: BTreeMap::new(),
                metadata: DisasterMetadata::default(),
            },
        };

        let mut header = Vec::new();
        header.extend_from_slice(b"{\"id\":");
        header.extend(serde_json::to_vec(id)?);
        header.extend_from_slice(b",\"timestamp\":");
        header.extend(serde_json::to_vec(&timestamp)?);
        header.extend_from_slice(b",\"description\":");
        header.extend(serde_json::to_vec(description)?);
        header.extend_from_slice(b",\"tables\":{");
        writer.put(&header).await?;
        Ok(writer)
    }

    /// Appends one table's rows.
    pub async fn write_table(&mut self, name: &str, rows: &[Record]) -> AppResult<()> {
        if self.section != Section::Tables {
            return Err(AppError::internal("Tables must be written before files"));
        }
        let mut chunk = Vec::new();
        if !self.first_in_section {
            chunk.push(b',');
        }
        chunk.extend(serde_json::to_vec(name)?);
        chunk.push(b':');
        chunk.extend(serde_json::to_vec(rows)?);
        self.put(&chunk).await?;

        self.first_in_section = false;
        self.summary.tables.insert(name.to_string(), rows.len() as u64);
        self.summary.metadata.total_records += rows.len() as u64;
        self.summary.metadata.size_estimate += chunk.len() as u64;
        Ok(())
    }

    /// Records a table whose export failed.
    pub fn mark_failed(&mut self, name: &str) {
        self.summary.metadata.failed_tables.push(name.to_string());
    }

    /// Appends one file, base64-encoded, keyed by its relative path.
    pub async fn write_file(&mut self, relative: &str, data: &[u8]) -> AppResult<()> {
        self.enter_files().await?;

        let encoded = STANDARD.encode(data);
        let mut chunk = Vec::with_capacity(encoded.len() + relative.len() + 8);
        if !self.first_in_section {
            chunk.push(b',');
        }
        chunk.extend(serde_json::to_vec(relative)?);
        chunk.extend_from_slice(b":\"");
        chunk.extend_from_slice(encoded.as_bytes());
        chunk.push(b'"');
        self.put(&chunk).await?;

        self.first_in_section = false;
        self.checksums.insert(relative.to_string(), crc32(data));
        self.summary.files.insert(relative.to_string(), data.len() as u64);
        self.summary.metadata.total_files += 1;
        self.summary.metadata.size_estimate += encoded.len() as u64;
        Ok(())
    }

    /// Writes checksums and metadata, syncs the temp file and renames it
    /// into place.
    pub async fn finish(mut self) -> AppResult<DisasterSummary> {
        self.enter_files().await?;

        let mut trailer = Vec::new();
        trailer.extend_from_slice(b"},\"checksums\":");
        trailer.extend(serde_json::to_vec(&self.checksums)?);
        trailer.extend_from_slice(b",\"metadata\":");
        trailer.extend(serde_json::to_vec(&self.summary.metadata)?);
        trailer.push(b'}');
        self.put(&trailer).await?;

        self.out.flush().await?;
        self.out.get_mut().sync_all().await?;
        fs::rename(&self.tmp.path, &self.path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to move artifact into place: {}", self.path.display()),
                e,
            )
        })?;
        self.tmp.armed = false;
        Ok(self.summary)
    }

    async fn enter_files(&mut self) -> AppResult<()> {
        if self.section == Section::Tables {
            self.put(b"},\"files\":{").await?;
            self.section = Section::Files;
            self.first_in_section = true;
        }
        Ok(())
    }

    async fn put(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.out.write_all(bytes).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to write artifact: {}", self.tmp.path.display()),
                e,
            )
        })
    }
}

/// Loads a whole artifact. A missing file is `RestoreNotFound`.
pub async fn load(path: &Path) -> AppResult<DisasterSnapshot> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::restore_not_found(format!(
                "Disaster-recovery backup not found: {}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    tokio::task::spawn_blocking(move || serde_json::from_slice::<DisasterSnapshot>(&raw))
        .await
        .map_err(|e| AppError::internal(format!("Artifact parse task failed: {e}")))?
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Serialization,
                format!("Corrupt disaster-recovery backup: {}", path.display()),
                e,
            )
        })
}

/// Decodes one inlined file.
pub fn decode_file(encoded: &str) -> AppResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| AppError::with_source(ErrorKind::Serialization, "Invalid base64 file payload", e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_streamed_artifact_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dr-1.json");

        let mut writer = ArtifactWriter::create(path.clone(), "dr-1", Utc::now(), "nightly")
            .await
            .unwrap();
        writer
            .write_table("jobs", &[json!({"id": 1}), json!({"id": 2})])
            .await
            .unwrap();
        writer.write_table("cvs", &[]).await.unwrap();
        writer.mark_failed("cvs");
        writer.write_file("cv-1.pdf", b"%PDF").await.unwrap();
        writer.write_file("images/logo.png", b"png").await.unwrap();
        let summary = writer.finish().await.unwrap();

        assert!(!dir.path().join("dr-1.json.tmp").exists());
        let artifact = load(&path).await.unwrap();
        assert_eq!(artifact.tables["jobs"].len(), 2);
        assert!(artifact.tables["cvs"].is_empty());
        assert_eq!(decode_file(&artifact.files["cv-1.pdf"]).unwrap(), b"%PDF");
        assert_eq!(artifact.checksums["images/logo.png"], crc32(b"png"));
        assert_eq!(artifact.metadata, summary.metadata);
        assert_eq!(summary.metadata.total_records, 2);
        assert_eq!(summary.metadata.total_files, 2);
        assert_eq!(summary.metadata.failed_tables, vec!["cvs".to_string()]);
        assert_eq!(DisasterSummary::from_snapshot(&artifact), summary);
    }

    #[tokio::test]
    async fn test_artifact_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dr-2.json");
        let writer = ArtifactWriter::create(path.clone(), "dr-2", Utc::now(), "")
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let artifact = load(&path).await.unwrap();
        assert!(artifact.tables.is_empty());
        assert!(artifact.files.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_writer_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dr-3.json");
        let mut writer = ArtifactWriter::create(path.clone(), "dr-3", Utc::now(), "")
            .await
            .unwrap();
        writer.write_table("jobs", &[json!({"id": 1})]).await.unwrap();
        assert!(dir.path().join("dr-3.json.tmp").is_file());

        drop(writer);
        assert!(!dir.path().join("dr-3.json.tmp").exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_restore_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.json")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RestoreNotFound);
    }
}
