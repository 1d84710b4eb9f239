//! Stored file domain entities.

pub mod category;
pub mod metadata;
pub mod sidecar;

pub use category::FileCategory;
pub use metadata::FileMetadata;
pub use sidecar::FileSidecar;
