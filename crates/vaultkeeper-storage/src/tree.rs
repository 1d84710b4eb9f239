//! Whole-directory operations used by the snapshot and recovery engines.
//!
//! Directory walks use `walkdir` on the blocking pool; single-file I/O
//! stays on `tokio::fs`.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;

/// One regular file found under a walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Totals of a tree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeCopy {
    /// Files copied.
    pub files: u64,
    /// Bytes copied.
    pub bytes: u64,
}

/// List every regular file under `root`, sorted by relative path.
///
/// A missing root yields an empty list.
pub async fn walk_files(root: &Path) -> AppResult<Vec<TreeEntry>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || walk_files_blocking(&root))
        .await
        .map_err(|e| AppError::internal(format!("Directory walk task failed: {e}")))?
}

fn walk_files_blocking(root: &Path) -> AppResult<Vec<TreeEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            AppError::storage(format!("Failed to walk {}: {e}", root.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| AppError::internal(format!("Walked outside root: {e}")))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        entries.push(TreeEntry {
            relative,
            absolute: entry.into_path(),
            size_bytes,
        });
    }

    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(entries)
}

/// Copy every file under `src` into `dst`, recreating subdirectories.
///
/// A missing `src` produces an empty `dst`.
pub async fn copy_tree(src: &Path, dst: &Path) -> AppResult<TreeCopy> {
    fs::create_dir_all(dst).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::StorageWriteFailed,
            format!("Failed to create directory: {}", dst.display()),
            e,
        )
    })?;

    let mut totals = TreeCopy::default();
    for entry in walk_files(src).await? {
        let target = dst.join(&entry.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = fs::copy(&entry.absolute, &target).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to copy {} -> {}", entry.relative, target.display()),
                e,
            )
        })?;
        totals.files += 1;
        totals.bytes += bytes;
    }

    debug!(
        src = %src.display(),
        dst = %dst.display(),
        files = totals.files,
        bytes = totals.bytes,
        "Copied directory tree"
    );
    Ok(totals)
}

/// Total size of every file under `root`.
pub async fn dir_size(root: &Path) -> AppResult<u64> {
    Ok(walk_files(root).await?.iter().map(|e| e.size_bytes).sum())
}

/// Rename `path` to a sibling named `<name>.<suffix>`.
///
/// Returns the new location, or `None` when `path` does not exist.
pub async fn rename_aside(path: &Path, suffix: &str) -> AppResult<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| AppError::validation(format!("Cannot rename {}", path.display())))?;
    name.push(format!(".{suffix}"));
    let aside = path.with_file_name(name);

    fs::rename(path, &aside).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to rename {} aside", path.display()),
            e,
        )
    })?;

    debug!(from = %path.display(), to = %aside.display(), "Renamed directory aside");
    Ok(Some(aside))
}

/// Remove a directory tree if it exists.
pub async fn remove_tree(path: &Path) -> AppResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to remove {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_tree_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("images")).await.unwrap();
        fs::write(src.join("cv.pdf"), b"pdf").await.unwrap();
        fs::write(src.join("images/logo.png"), b"png!").await.unwrap();

        let dst = dir.path().join("dst");
        let totals = copy_tree(&src, &dst).await.unwrap();

        assert_eq!(totals, TreeCopy { files: 2, bytes: 7 });
        assert_eq!(fs::read(dst.join("images/logo.png")).await.unwrap(), b"png!");

        let entries = walk_files(&dst).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative.as_str()).collect();
        assert_eq!(names, vec!["cv.pdf", "images/logo.png"]);
        assert_eq!(dir_size(&dst).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_missing_source_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let totals = copy_tree(&dir.path().join("absent"), &dir.path().join("dst"))
            .await
            .unwrap();
        assert_eq!(totals.files, 0);
        assert!(dir.path().join("dst").is_dir());
    }

    #[tokio::test]
    async fn test_rename_aside() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content-store");
        fs::create_dir_all(&content).await.unwrap();

        let aside = rename_aside(&content, "pre-restore-1").await.unwrap().unwrap();
        assert_eq!(aside, dir.path().join("content-store.pre-restore-1"));
        assert!(!content.exists());
        assert!(aside.is_dir());

        assert!(rename_aside(&content, "x").await.unwrap().is_none());
    }
}
