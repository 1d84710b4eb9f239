//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Cron schedules (six fields, seconds first) and deadlines for periodic jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the scheduler is started by the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Protection verification pass.
    #[serde(default = "default_verify_schedule")]
    pub verify_schedule: String,
    /// Emergency copy of every known-category artifact.
    #[serde(default = "default_emergency_schedule")]
    pub emergency_schedule: String,
    /// Lightweight snapshot backup followed by retention cleanup.
    #[serde(default = "default_snapshot_schedule")]
    pub snapshot_schedule: String,
    /// Full disaster-recovery backup.
    #[serde(default = "default_disaster_schedule")]
    pub disaster_schedule: String,
    /// Deadline for a single job run; exceeding it marks the run failed.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_schedule: default_verify_schedule(),
            emergency_schedule: default_emergency_schedule(),
            snapshot_schedule: default_snapshot_schedule(),
            disaster_schedule: default_disaster_schedule(),
            job_timeout_seconds: default_job_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_verify_schedule() -> String {
    "0 */30 * * * *".to_string()
}

fn default_emergency_schedule() -> String {
    "0 0 */6 * * *".to_string()
}

fn default_snapshot_schedule() -> String {
    "0 0 * * * *".to_string()
}

fn default_disaster_schedule() -> String {
    "0 0 3 * * *".to_string()
}

fn default_job_timeout() -> u64 {
    1800
}
