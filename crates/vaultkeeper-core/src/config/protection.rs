//! Redundant file protection configuration.

use serde::{Deserialize, Serialize};

/// Where redundant copies and emergency backups are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// Copy #1, namespaced by owner id.
    #[serde(default = "default_protection_dir")]
    pub protection_dir: String,
    /// Copy #2, namespaced by sanitized owner contact key.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Copy #3, namespaced by version stamp. Relative to `backup_dir`.
    #[serde(default = "default_versions_dir")]
    pub versions_dir: String,
    /// Root for timestamped emergency backups.
    #[serde(default = "default_emergency_dir")]
    pub emergency_dir: String,
    /// Number of emergency backup directories to keep.
    #[serde(default = "default_emergency_retain")]
    pub emergency_retain: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            protection_dir: default_protection_dir(),
            backup_dir: default_backup_dir(),
            versions_dir: default_versions_dir(),
            emergency_dir: default_emergency_dir(),
            emergency_retain: default_emergency_retain(),
        }
    }
}

fn default_protection_dir() -> String {
    "protection-store".to_string()
}

fn default_backup_dir() -> String {
    "backup-store".to_string()
}

fn default_versions_dir() -> String {
    "versions".to_string()
}

fn default_emergency_dir() -> String {
    "emergency".to_string()
}

fn default_emergency_retain() -> usize {
    5
}
