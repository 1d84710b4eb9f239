//! Lightweight directory snapshots.

pub mod engine;
pub mod metadata_log;

pub use engine::{CleanupReport, SnapshotEngine, SnapshotRestoreReport};
pub use metadata_log::SnapshotLog;
