//! Convenience result type alias for Vaultkeeper.

use crate::error::AppError;

/// A specialized `Result` type for Vaultkeeper operations.
pub type AppResult<T> = Result<T, AppError>;
