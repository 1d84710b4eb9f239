//! Built-in job handler implementations.

pub mod backup;
pub mod protection;

pub use backup::{DisasterBackupJobHandler, SnapshotBackupJobHandler};
pub use protection::{EmergencyBackupJobHandler, VerifyProtectionJobHandler};

/// Job type of the protection verification pass.
pub const VERIFY_PROTECTION: &str = "verify_protection";
/// Job type of the emergency copy.
pub const EMERGENCY_BACKUP: &str = "emergency_backup";
/// Job type of the hourly snapshot backup.
pub const SNAPSHOT_BACKUP: &str = "snapshot_backup";
/// Job type of the nightly disaster-recovery backup.
pub const DISASTER_BACKUP: &str = "disaster_backup";
