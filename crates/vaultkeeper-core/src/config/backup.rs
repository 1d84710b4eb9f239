//! Snapshot and disaster-recovery backup configuration.

use serde::{Deserialize, Serialize};

/// Lightweight directory snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory that holds one sub-directory per snapshot.
    #[serde(default = "default_snapshot_dir")]
    pub directory: String,
    /// Maximum number of entries kept in the metadata log.
    #[serde(default = "default_metadata_log_cap")]
    pub metadata_log_cap: usize,
    /// Number of completed snapshot directories kept by cleanup.
    #[serde(default = "default_retain_completed")]
    pub retain_completed: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: default_snapshot_dir(),
            metadata_log_cap: default_metadata_log_cap(),
            retain_completed: default_retain_completed(),
        }
    }
}

/// Full self-contained disaster-recovery backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisasterRecoveryConfig {
    /// Directory holding `<id>.json` and `<id>-summary.json` artifacts.
    #[serde(default = "default_dr_dir")]
    pub directory: String,
    /// Number of artifacts kept by cleanup.
    #[serde(default = "default_dr_retain")]
    pub retain: usize,
}

impl Default for DisasterRecoveryConfig {
    fn default() -> Self {
        Self {
            directory: default_dr_dir(),
            retain: default_dr_retain(),
        }
    }
}

fn default_snapshot_dir() -> String {
    "snapshots".to_string()
}

fn default_metadata_log_cap() -> usize {
    50
}

fn default_retain_completed() -> usize {
    10
}

fn default_dr_dir() -> String {
    "disaster-recovery".to_string()
}

fn default_dr_retain() -> usize {
    5
}
