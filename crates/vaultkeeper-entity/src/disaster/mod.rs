//! Disaster-recovery artifact entities.

pub mod model;

pub use model::{DisasterListing, DisasterMetadata, DisasterSnapshot, DisasterSummary};
