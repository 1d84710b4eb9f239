//! Retention registry of primary artifacts.

pub mod registry;

pub use registry::{IntegrityAudit, RetentionRegistry};
