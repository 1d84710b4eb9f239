//! # vaultkeeper-service
//!
//! Protection and recovery services for Vaultkeeper: redundant file copies,
//! the retention registry, CV file assignment, directory snapshots and
//! self-contained disaster-recovery backups.
//!
//! Services follow constructor injection; all dependencies are provided
//! at construction time via `Arc` references. [`ServiceContainer`] wires
//! them from an [`AppConfig`](vaultkeeper_core::config::AppConfig).

pub mod admin;
pub mod assignment;
pub mod container;
pub mod disaster;
pub mod guard;
pub mod naming;
pub mod protection;
pub mod retention;
pub mod snapshot;

pub use admin::AdminService;
pub use assignment::{AssignmentService, CvUpload, RecoveredFile, StoredFile};
pub use container::ServiceContainer;
pub use disaster::DisasterRecoveryEngine;
pub use guard::{OperationGuard, OperationPermit};
pub use protection::{ProtectionEngine, ProtectionManifest};
pub use retention::RetentionRegistry;
pub use snapshot::{SnapshotEngine, SnapshotLog};
