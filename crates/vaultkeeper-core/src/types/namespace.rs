//! Storage namespaces: the independent areas a file can live in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An independently rooted storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// The primary content store.
    Content,
    /// Redundant copies keyed by owner id.
    Protection,
    /// Redundant copies keyed by owner contact key, plus the versions area.
    Backup,
}

impl Namespace {
    /// Return the namespace as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Protection => "protection",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
