//! Advisory file locks shared between processes (`flock` on Unix).
//!
//! The server and the CLI may run against the same data root. In-process
//! mutexes cannot see each other across processes, so anything that must
//! be exclusive for the whole data root also holds one of these.

use std::fs::{File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;

/// An exclusive lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock without waiting. `Ok(None)` when another handle
    /// holds it.
    pub fn try_acquire(path: &Path) -> AppResult<Option<Self>> {
        let file = open(path)?;
        let acquired = FileExt::try_lock_exclusive(&file).map_err(|e| lock_error(path, e))?;
        if !acquired {
            return Ok(None);
        }
        debug!(path = %path.display(), "File lock acquired");
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Takes the lock, waiting on a blocking thread until it is free.
    pub async fn acquire(path: &Path) -> AppResult<Self> {
        let owned = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            let file = open(&owned)?;
            FileExt::lock_exclusive(&file).map_err(|e| lock_error(&owned, e))?;
            Ok::<_, AppError>(file)
        })
        .await
        .map_err(|e| AppError::internal(format!("File lock task failed: {e}")))??;
        debug!(path = %path.display(), "File lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Records the holder's name in the lock file for conflict messages.
    pub fn set_holder(&mut self, holder: &str) -> AppResult<()> {
        self.file.set_len(0)?;
        self.file.rewind()?;
        self.file.write_all(holder.as_bytes())?;
        Ok(())
    }

    /// Name the current holder of `path` recorded, if any.
    pub fn holder(path: &Path) -> Option<String> {
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// The locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "File lock released");
    }
}

/// Lock file guarding read-modify-write cycles on `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open(path: &Path) -> AppResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to open lock file: {}", path.display()),
                e,
            )
        })
}

fn lock_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::with_source(
        ErrorKind::Storage,
        format!("Failed to lock {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_handle_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let mut first = FileLock::try_acquire(&path).unwrap().unwrap();
        first.set_holder("snapshot backup").unwrap();
        assert!(FileLock::try_acquire(&path).unwrap().is_none());
        assert_eq!(FileLock::holder(&path).as_deref(), Some("snapshot backup"));

        drop(first);
        assert!(FileLock::holder(&path).is_none());
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json.lock");
        let first = FileLock::try_acquire(&path).unwrap().unwrap();

        let waiter = {
            let path = path.clone();
            tokio::spawn(async move { FileLock::acquire(&path).await.map(|_| ()) })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
    }

    #[test]
    fn test_lock_path_is_a_sibling() {
        assert_eq!(
            lock_path_for(Path::new("/data/registry/file-registry.json")),
            PathBuf::from("/data/registry/file-registry.json.lock")
        );
    }
}
