//! Advisory lock serialising operations that mutate shared directories.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_storage::FileLock;

/// Allows at most one backup, restore or protection cycle at a time.
///
/// Clones share the same lock. A guard built with
/// [`with_lock_file`](Self::with_lock_file) also excludes other processes
/// using the same lock file.
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    /// The in-process lock.
    lock: Arc<Mutex<()>>,
    /// Name of the operation holding the lock, for conflict messages.
    current: Arc<StdMutex<Option<String>>>,
    /// Lock file shared with other processes on the same data root.
    lock_file: Option<PathBuf>,
}

/// Proof that the holder owns the guard. Releases it on drop.
#[derive(Debug)]
pub struct OperationPermit {
    _lock: OwnedMutexGuard<()>,
    _file: Option<FileLock>,
    current: Arc<StdMutex<Option<String>>>,
    operation: String,
}

impl OperationGuard {
    /// Creates a new, unheld guard local to this process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a guard that also holds an OS lock on `path` while a permit
    /// is alive.
    pub fn with_lock_file(path: impl Into<PathBuf>) -> Self {
        Self {
            lock_file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Acquire the guard without waiting.
    ///
    /// Fails with `Conflict` naming the running operation when held here
    /// or by another process.
    pub fn try_begin(&self, operation: &str) -> AppResult<OperationPermit> {
        let lock = match self.lock.clone().try_lock_owned() {
            Ok(lock) => lock,
            Err(_) => return Err(self.conflict(operation)),
        };
        let file = match &self.lock_file {
            Some(path) => match FileLock::try_acquire(path)? {
                Some(mut file) => {
                    file.set_holder(operation)?;
                    Some(file)
                }
                None => return Err(self.conflict(operation)),
            },
            None => None,
        };
        Ok(self.permit(lock, file, operation))
    }

    /// Acquire the guard, waiting for the running operation to finish.
    pub async fn begin(&self, operation: &str) -> AppResult<OperationPermit> {
        let lock = self.lock.clone().lock_owned().await;
        let file = match &self.lock_file {
            Some(path) => {
                let mut file = FileLock::acquire(path).await?;
                file.set_holder(operation)?;
                Some(file)
            }
            None => None,
        };
        Ok(self.permit(lock, file, operation))
    }

    /// Name of the operation holding the guard in this process.
    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Name of the operation holding the guard here or in another process.
    pub fn holder(&self) -> Option<String> {
        self.current()
            .or_else(|| self.lock_file.as_deref().and_then(FileLock::holder))
    }

    fn conflict(&self, operation: &str) -> AppError {
        let running = self
            .holder()
            .unwrap_or_else(|| "another operation".to_string());
        AppError::conflict(format!("Cannot start {operation}: {running} is in progress"))
    }

    fn permit(
        &self,
        lock: OwnedMutexGuard<()>,
        file: Option<FileLock>,
        operation: &str,
    ) -> OperationPermit {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(operation.to_string());
        debug!(operation, "Operation guard acquired");
        OperationPermit {
            _lock: lock,
            _file: file,
            current: self.current.clone(),
            operation: operation.to_string(),
        }
    }
}

impl OperationPermit {
    /// Name of the operation this permit was issued for.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        debug!(operation = %self.operation, "Operation guard released");
    }
}
