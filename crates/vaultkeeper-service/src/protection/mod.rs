//! Redundant file protection.

pub mod engine;
pub mod manifest;

pub use engine::{EmergencyBackupReport, ProtectionEngine, VerificationReport};
pub use manifest::ProtectionManifest;
