//! Core traits defined in `vaultkeeper-core` and implemented by other crates.

pub mod record_store;
pub mod storage;

pub use record_store::{Record, RecordStore, TableData};
pub use storage::StorageProvider;
