//! Self-contained disaster-recovery backups.

pub mod artifact;
pub mod engine;

pub use artifact::ArtifactWriter;
pub use engine::{DisasterCleanupReport, DisasterRecoveryEngine, DisasterRestoreReport};
