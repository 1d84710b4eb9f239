//! Scheduled protection and backup work for Vaultkeeper.
//!
//! This crate provides:
//! - A job executor that dispatches to handlers under a per-run deadline
//! - Handlers for protection verification, emergency copies, snapshot and
//!   disaster-recovery backups
//! - A cron scheduler that runs those handlers periodically

pub mod executor;
pub mod jobs;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use scheduler::CronScheduler;
