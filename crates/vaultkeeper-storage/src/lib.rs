//! # vaultkeeper-storage
//!
//! Storage for Vaultkeeper: the local filesystem provider, a manager that
//! routes each [`Namespace`](vaultkeeper_core::types::Namespace) to its
//! provider, whole-directory operations used by the backup engines,
//! cross-process file locks and CRC32 checksums.

pub mod atomic;
pub mod checksum;
pub mod lock;
pub mod manager;
pub mod providers;
pub mod tree;

pub use lock::FileLock;
pub use manager::StorageManager;
pub use providers::LocalStorageProvider;
