//! Sidecar metadata written next to each stored artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to a stored name to form its sidecar file name.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Ownership facts stored beside an artifact, independent of the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSidecar {
    /// Owning record id.
    pub owner_id: String,
    /// File name as uploaded.
    pub original_name: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type.
    pub mime_type: String,
}

impl FileSidecar {
    /// Sidecar file name for a stored artifact.
    pub fn path_for(stored_name: &str) -> String {
        format!("{stored_name}{SIDECAR_SUFFIX}")
    }

    /// Whether a content-store file name is itself a sidecar.
    pub fn is_sidecar(name: &str) -> bool {
        name.ends_with(SIDECAR_SUFFIX)
    }
}
