//! Snapshot metadata entity model.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal state of a snapshot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// Tables and files were captured (possibly with per-table gaps).
    Completed,
    /// The snapshot could not be written.
    Failed,
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Metadata for one directory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time-based unique id, also the directory name.
    pub id: String,
    /// When the snapshot started.
    pub timestamp: DateTime<Utc>,
    /// Operator or scheduler supplied description.
    pub description: String,
    /// Tables included.
    pub tables: Vec<String>,
    /// Row count per exported table.
    #[serde(default)]
    pub table_counts: BTreeMap<String, usize>,
    /// Tables whose export failed and were written empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tables: Vec<String>,
    /// Number of content files copied.
    pub file_count: u64,
    /// Total size of the snapshot directory.
    pub size_bytes: u64,
    /// Human-readable size.
    pub size_display: String,
    /// Terminal state.
    pub status: SnapshotStatus,
    /// Failure reason for failed snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Snapshot {
    /// Whether the snapshot completed.
    pub fn is_completed(&self) -> bool {
        self.status == SnapshotStatus::Completed
    }
}
