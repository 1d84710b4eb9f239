//! Redundant copy protection entities.

pub mod model;
pub mod status;

pub use model::{CopyLocation, ProtectionRecord};
pub use status::ProtectionStatus;
