//! Storage layout configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
///
/// Every directory below is resolved relative to `data_root` unless it is
/// given as an absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all runtime data.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Primary content store holding uploaded artifacts.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    /// Directory holding the file registry and protection manifest.
    #[serde(default = "default_registry_dir")]
    pub registry_dir: String,
    /// Maximum upload size in bytes (default 20 MB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
}

impl StorageConfig {
    /// Resolve a configured directory against the data root.
    pub fn resolve(&self, dir: &str) -> PathBuf {
        let path = PathBuf::from(dir);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.data_root).join(path)
        }
    }

    /// Absolute path of the primary content store.
    pub fn content_root(&self) -> PathBuf {
        self.resolve(&self.content_dir)
    }

    /// Absolute path of the registry directory.
    pub fn registry_root(&self) -> PathBuf {
        self.resolve(&self.registry_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            content_dir: default_content_dir(),
            registry_dir: default_registry_dir(),
            max_upload_size_bytes: default_max_upload(),
        }
    }
}

fn default_data_root() -> String {
    "./data".to_string()
}

fn default_content_dir() -> String {
    "content-store".to_string()
}

fn default_registry_dir() -> String {
    "registry".to_string()
}

fn default_max_upload() -> u64 {
    20_971_520 // 20 MB
}
