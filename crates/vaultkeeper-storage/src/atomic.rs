//! Crash-safe whole-file writes.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;

/// Write `data` to `path` through a sibling temp file and a rename, so a
/// reader sees either the old contents or the new ones, never a torn file.
pub async fn write_atomic(path: &Path, data: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageWriteFailed,
                format!("Failed to create directory: {}", parent.display()),
                e,
            )
        })?;
    }

    let tmp = temp_path(path);
    let mut file = fs::File::create(&tmp).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::StorageWriteFailed,
            format!("Failed to create temp file: {}", tmp.display()),
            e,
        )
    })?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::StorageWriteFailed,
            format!("Failed to move {} into place", tmp.display()),
            e,
        )
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> AppResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data).await
}

/// Read and parse a JSON file, returning `None` when it does not exist.
pub async fn read_json_optional<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> AppResult<Option<T>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/log.json");

        write_json_atomic(&path, &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<u32>> = read_json_optional(&path).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(!dir.path().join("nested/log.json.tmp").exists());

        let missing: Option<Vec<u32>> = read_json_optional(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
