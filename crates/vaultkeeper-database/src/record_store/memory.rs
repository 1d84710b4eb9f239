//! In-process record store.
//!
//! Keeps every table in memory behind a `RwLock`. Rows are keyed by their
//! `id` field; declared foreign keys are enforced the way PostgreSQL would
//! enforce them on bulk loads, so restore ordering mistakes surface here too.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::{Record, RecordStore, TableData};

/// A declared `child → parent` dependency between tables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ForeignKey {
    child: String,
    parent: String,
}

/// Record store holding every table in memory.
#[derive(Debug)]
pub struct MemoryRecordStore {
    tables: RwLock<BTreeMap<String, Vec<Record>>>,
    foreign_keys: Vec<ForeignKey>,
}

impl MemoryRecordStore {
    /// Create a store with the given (empty) tables.
    pub fn new(tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tables: RwLock::new(
                tables
                    .into_iter()
                    .map(|t| (t.into(), Vec::new()))
                    .collect(),
            ),
            foreign_keys: Vec::new(),
        }
    }

    /// Declare that rows of `child` reference rows of `parent`.
    ///
    /// Loading a non-empty `child` while `parent` is empty, or clearing a
    /// `parent` while `child` still has rows, is rejected.
    pub fn with_foreign_key(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey {
            child: child.into(),
            parent: parent.into(),
        });
        self
    }

    /// Row count of a table.
    pub async fn count(&self, table: &str) -> AppResult<usize> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(Vec::len)
            .ok_or_else(|| unknown_table(table))
    }

    fn check_import(
        &self,
        tables: &BTreeMap<String, Vec<Record>>,
        table: &str,
        records: &[Record],
    ) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        for fk in self.foreign_keys.iter().filter(|fk| fk.child == table) {
            let parent_empty = tables.get(&fk.parent).is_none_or(|rows| rows.is_empty());
            if parent_empty {
                return Err(AppError::database(format!(
                    "Insert into '{table}' violates foreign key to '{}': parent table is empty",
                    fk.parent
                )));
            }
        }
        Ok(())
    }

    fn check_clear(&self, tables: &BTreeMap<String, Vec<Record>>, table: &str) -> AppResult<()> {
        for fk in self.foreign_keys.iter().filter(|fk| fk.parent == table) {
            let child_has_rows = tables.get(&fk.child).is_some_and(|rows| !rows.is_empty());
            if child_has_rows {
                return Err(AppError::database(format!(
                    "Delete from '{table}' violates foreign key from '{}'",
                    fk.child
                )));
            }
        }
        Ok(())
    }

    fn insert_into(
        &self,
        tables: &mut BTreeMap<String, Vec<Record>>,
        table: &str,
        records: Vec<Record>,
    ) -> AppResult<u64> {
        self.check_import(tables, table, &records)?;
        let rows = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;

        let mut seen: HashSet<String> = rows.iter().filter_map(record_key).collect();
        let mut inserted = 0u64;
        for record in records {
            if let Some(key) = record_key(&record) {
                if !seen.insert(key) {
                    continue;
                }
            }
            rows.push(record);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn clear_in(&self, tables: &mut BTreeMap<String, Vec<Record>>, table: &str) -> AppResult<u64> {
        self.check_clear(tables, table)?;
        let rows = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let deleted = rows.len() as u64;
        rows.clear();
        Ok(deleted)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn export_table(&self, table: &str) -> AppResult<Vec<Record>> {
        let tables = self.tables.read().await;
        tables.get(table).cloned().ok_or_else(|| unknown_table(table))
    }

    async fn import_table(&self, table: &str, records: Vec<Record>) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        self.insert_into(&mut tables, table, records)
    }

    async fn clear_table(&self, table: &str) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        self.clear_in(&mut tables, table)
    }

    /// Apply the whole replacement to a copy and swap it in only when every
    /// step succeeded.
    async fn replace_tables(&self, replacement: Vec<TableData>) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        for table in replacement.iter().rev() {
            self.clear_in(&mut staged, &table.name)?;
        }
        let mut inserted = 0u64;
        for table in replacement {
            inserted += self.insert_into(&mut staged, &table.name, table.records)?;
        }

        *tables = staged;
        Ok(inserted)
    }
}

fn record_key(record: &Record) -> Option<String> {
    record.get("id").map(|id| id.to_string())
}

fn unknown_table(table: &str) -> AppError {
    AppError::not_found(format!("Table '{table}' does not exist"))
}
