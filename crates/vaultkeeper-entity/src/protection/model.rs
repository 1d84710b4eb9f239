//! Protection record entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultkeeper_core::types::Namespace;

use super::status::ProtectionStatus;

/// One redundant copy of a protected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyLocation {
    /// Storage area holding the copy.
    pub namespace: Namespace,
    /// Path relative to the namespace root.
    pub path: String,
    /// Size written.
    pub size_bytes: u64,
}

impl std::fmt::Display for CopyLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// Manifest entry describing the redundant copies of one owner's file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionRecord {
    /// Owning record id (e.g. the CV id).
    pub owner_id: String,
    /// Owner contact key (e.g. email).
    pub owner_key: String,
    /// File name as uploaded.
    pub original_filename: String,
    /// Copies that were written successfully, in restore preference order.
    pub copies: Vec<CopyLocation>,
    /// CRC32 of the protected content.
    pub checksum: u32,
    /// When this protection cycle ran.
    pub protected_at: DateTime<Utc>,
    /// Result of the latest verification.
    pub status: ProtectionStatus,
    /// When the status was last verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}
