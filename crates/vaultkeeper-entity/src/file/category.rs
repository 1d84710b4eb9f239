//! File category enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of artifact a stored file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    /// A CV attached to a candidate record.
    #[serde(rename = "attachment-cv")]
    AttachmentCv,
    /// An image (logo, avatar).
    #[serde(rename = "image")]
    Image,
    /// Anything else.
    #[serde(rename = "other")]
    Other,
}

impl FileCategory {
    /// Whether emergency backups capture this category.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Return the category as its serialized string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttachmentCv => "attachment-cv",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
