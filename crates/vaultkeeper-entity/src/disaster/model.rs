//! Self-contained disaster-recovery artifact and its summary view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate figures for a disaster-recovery artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisasterMetadata {
    /// Rows across every table.
    pub total_records: u64,
    /// Files inlined.
    pub total_files: u64,
    /// Approximate artifact size from encoded lengths.
    pub size_estimate: u64,
    /// Tables whose export failed and were written empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tables: Vec<String>,
}

/// A complete, portable backup: every table and every content file.
///
/// Restoring it requires no other input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterSnapshot {
    /// Time-based unique id, also the artifact file stem.
    pub id: String,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Operator or scheduler supplied description.
    pub description: String,
    /// Table name to rows.
    pub tables: BTreeMap<String, Vec<serde_json::Value>>,
    /// Path relative to the content store to base64 file bytes.
    pub files: BTreeMap<String, String>,
    /// Path relative to the content store to CRC32 of the raw bytes.
    #[serde(default)]
    pub checksums: BTreeMap<String, u32>,
    /// Aggregate figures.
    pub metadata: DisasterMetadata,
}

/// Cheap browsing view of a [`DisasterSnapshot`] without payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterSummary {
    /// Artifact id.
    pub id: String,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Description.
    pub description: String,
    /// Table name to row count.
    pub tables: BTreeMap<String, u64>,
    /// Path to raw byte length.
    pub files: BTreeMap<String, u64>,
    /// Aggregate figures.
    pub metadata: DisasterMetadata,
}

impl DisasterSummary {
    /// Build the summary view of a full artifact.
    pub fn from_snapshot(snapshot: &DisasterSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            timestamp: snapshot.timestamp,
            description: snapshot.description.clone(),
            tables: snapshot
                .tables
                .iter()
                .map(|(name, rows)| (name.clone(), rows.len() as u64))
                .collect(),
            files: snapshot
                .files
                .iter()
                .map(|(path, encoded)| (path.clone(), decoded_len(encoded)))
                .collect(),
            metadata: snapshot.metadata.clone(),
        }
    }
}

/// Listing row for an artifact on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterListing {
    /// Artifact id.
    pub id: String,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Description.
    pub description: String,
    /// Aggregate figures.
    pub metadata: DisasterMetadata,
}

impl From<DisasterSummary> for DisasterListing {
    fn from(summary: DisasterSummary) -> Self {
        Self {
            id: summary.id,
            timestamp: summary.timestamp,
            description: summary.description,
            metadata: summary.metadata,
        }
    }
}

/// Raw byte length of standard padded base64 text.
fn decoded_len(encoded: &str) -> u64 {
    let padding = encoded.bytes().rev().take_while(|b| *b == b'=').count();
    ((encoded.len() / 4) * 3).saturating_sub(padding) as u64
}
