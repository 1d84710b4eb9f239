//! # vaultkeeper-database
//!
//! PostgreSQL connection management and the [`RecordStore`] implementations
//! the backup engines read from and restore into.

pub mod connection;
pub mod record_store;

use std::sync::Arc;

use vaultkeeper_core::config::DatabaseConfig;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::RecordStore;

pub use connection::DatabasePool;
pub use record_store::{MemoryRecordStore, PgRecordStore};

/// Build the record store selected by the database URL.
///
/// `memory:` URLs select the in-process store; anything else is treated
/// as a PostgreSQL connection string.
pub async fn connect_record_store(config: &DatabaseConfig) -> AppResult<Arc<dyn RecordStore>> {
    if config.url.starts_with("memory:") {
        tracing::warn!("Using in-memory record store; table data is not persisted");
        return Ok(Arc::new(MemoryRecordStore::new(config.tables.clone())));
    }

    let pool = DatabasePool::connect(config).await?;
    Ok(Arc::new(PgRecordStore::new(
        pool.into_pool(),
        config.tables.clone(),
    )?))
}
