//! Protection status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a protected file's redundant copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionStatus {
    /// Every copy is present and intact.
    Protected,
    /// At least one copy survives, but not all of them.
    Degraded,
    /// No copy survives.
    Lost,
}

impl ProtectionStatus {
    /// Derive the status from the number of healthy copies.
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if healthy == 0 {
            Self::Lost
        } else if healthy < total {
            Self::Degraded
        } else {
            Self::Protected
        }
    }

    /// Whether at least one copy survives.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Lost)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protected => "protected",
            Self::Degraded => "degraded",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for ProtectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
