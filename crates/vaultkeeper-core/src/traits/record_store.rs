//! Record store trait: bulk access to the relational tables.
//!
//! The protection and recovery engines never look inside a record. A table
//! is a named bag of JSON objects that can be exported, imported and
//! cleared as a whole.

use async_trait::async_trait;

use crate::error::AppError;
use crate::result::AppResult;

/// One opaque table row.
pub type Record = serde_json::Value;

/// The full contents of one table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableData {
    /// Table name.
    pub name: String,
    /// Every row of the table.
    pub records: Vec<Record>,
}

impl TableData {
    /// Create a table payload.
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

/// Bulk table access used by snapshot and disaster-recovery backups.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug + 'static {
    /// Export every row of a table.
    async fn export_table(&self, table: &str) -> AppResult<Vec<Record>>;

    /// Insert rows into a table, skipping rows whose key already exists.
    ///
    /// Returns the number of rows inserted.
    async fn import_table(&self, table: &str, records: Vec<Record>) -> AppResult<u64>;

    /// Delete every row of a table. Returns the number of rows deleted.
    async fn clear_table(&self, table: &str) -> AppResult<u64>;

    /// Replace the contents of the given tables.
    ///
    /// `tables` is in dependency order: tables are cleared in reverse order
    /// and reloaded in order. This default runs each step separately, so a
    /// failure after the first clear leaves the tables partially restored
    /// and is reported as `PartialRestore`. Stores with transactions should
    /// override it with an all-or-nothing version.
    async fn replace_tables(&self, tables: Vec<TableData>) -> AppResult<u64> {
        for table in tables.iter().rev() {
            self.clear_table(&table.name).await.map_err(|e| {
                AppError::partial_restore(format!(
                    "Failed to clear table '{}' during restore: {e}",
                    table.name
                ))
            })?;
        }

        let mut inserted = 0u64;
        for table in tables {
            let name = table.name;
            inserted += self
                .import_table(&name, table.records)
                .await
                .map_err(|e| {
                    AppError::partial_restore(format!(
                        "Failed to reload table '{name}' after clearing: {e}"
                    ))
                })?;
        }

        Ok(inserted)
    }
}
