//! Retention registry entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::FileCategory;

/// One registered artifact in the primary content store.
///
/// Entries are never mutated. When a record's active file changes, a new
/// entry supersedes the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Unique file name in the content store.
    pub stored_name: String,
    /// File name as uploaded.
    pub original_name: String,
    /// Artifact category.
    pub category: FileCategory,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type.
    pub mime_type: String,
    /// When the entry was registered.
    pub registered_at: DateTime<Utc>,
    /// Owning record id, when the artifact belongs to a record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// CRC32 of the content at registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
}
