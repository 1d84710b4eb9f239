//! PostgreSQL record store.
//!
//! Rows travel as JSON: `row_to_json` on export and
//! `jsonb_populate_recordset` on import, so no table needs a Rust model.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use vaultkeeper_core::error::{AppError, ErrorKind};
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::record_store::{Record, RecordStore, TableData};

/// Record store backed by the application's PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    /// Tables this store may touch. Table names are spliced into SQL, so
    /// only these names are ever accepted.
    tables: Vec<String>,
}

impl PgRecordStore {
    /// Create a store limited to the given tables.
    pub fn new(pool: PgPool, tables: Vec<String>) -> AppResult<Self> {
        for table in &tables {
            quote_ident(table)?;
        }
        Ok(Self { pool, tables })
    }

    /// Quote a configured table name, rejecting anything else.
    fn table_ident(&self, table: &str) -> AppResult<String> {
        if !self.tables.iter().any(|t| t == table) {
            return Err(AppError::validation(format!(
                "Table '{table}' is not managed by this store"
            )));
        }
        quote_ident(table)
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        ident: &str,
        records: Vec<Record>,
    ) -> Result<u64, sqlx::Error> {
        if records.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {ident} SELECT * FROM jsonb_populate_recordset(NULL::{ident}, $1) \
             ON CONFLICT DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(serde_json::Value::Array(records))
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn export_table(&self, table: &str) -> AppResult<Vec<Record>> {
        let ident = self.table_ident(table)?;
        let sql = format!("SELECT row_to_json(t) FROM {ident} t");
        let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to export table '{table}'"),
                    e,
                )
            })?;
        debug!(table, rows = rows.len(), "Exported table");
        Ok(rows)
    }

    async fn import_table(&self, table: &str, records: Vec<Record>) -> AppResult<u64> {
        let ident = self.table_ident(table)?;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        let inserted = Self::insert_in(&mut tx, &ident, records)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to import table '{table}'"),
                    e,
                )
            })?;
        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit import", e)
        })?;
        Ok(inserted)
    }

    async fn clear_table(&self, table: &str) -> AppResult<u64> {
        let ident = self.table_ident(table)?;
        let result = sqlx::query(&format!("DELETE FROM {ident}"))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to clear table '{table}'"),
                    e,
                )
            })?;
        Ok(result.rows_affected())
    }

    /// Clear and reload every table inside one transaction; any failure
    /// rolls the whole replacement back.
    async fn replace_tables(&self, tables: Vec<TableData>) -> AppResult<u64> {
        let idents = tables
            .iter()
            .map(|t| self.table_ident(&t.name))
            .collect::<AppResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        for (table, ident) in tables.iter().zip(&idents).rev() {
            sqlx::query(&format!("DELETE FROM {ident}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Database,
                        format!("Failed to clear table '{}'; restore rolled back", table.name),
                        e,
                    )
                })?;
        }

        let mut inserted = 0u64;
        for (table, ident) in tables.into_iter().zip(&idents) {
            let name = table.name;
            inserted += Self::insert_in(&mut tx, ident, table.records)
                .await
                .map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Database,
                        format!("Failed to reload table '{name}'; restore rolled back"),
                        e,
                    )
                })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit restore", e)
        })?;

        info!(rows = inserted, "Replaced table contents in one transaction");
        Ok(inserted)
    }
}

/// Double-quote a table name made of ASCII letters, digits and underscores.
pub fn quote_ident(name: &str) -> AppResult<String> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::validation(format!("Invalid table name: '{name}'")));
    }
    Ok(format!("\"{name}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("cvs").unwrap(), "\"cvs\"");
        assert_eq!(quote_ident("job_postings").unwrap(), "\"job_postings\"");
        assert!(quote_ident("cvs; DROP TABLE users").is_err());
        assert!(quote_ident("").is_err());
        assert!(quote_ident("1jobs").is_err());
    }
}
