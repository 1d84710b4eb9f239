//! Cron scheduler for periodic protection and backup jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use vaultkeeper_core::config::WorkerConfig;
use vaultkeeper_core::error::AppError;
use vaultkeeper_service::AdminService;

use crate::executor::JobExecutor;
use crate::jobs::{
    DISASTER_BACKUP, DisasterBackupJobHandler, EMERGENCY_BACKUP, EmergencyBackupJobHandler,
    SNAPSHOT_BACKUP, SnapshotBackupJobHandler, VERIFY_PROTECTION, VerifyProtectionJobHandler,
};

/// Cron-based scheduler for periodic background tasks
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    /// Dispatches fired jobs to their handlers
    executor: Arc<JobExecutor>,
    /// Schedules and deadline
    config: WorkerConfig,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("job_types", &self.executor.registered_types())
            .finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler with the built-in handlers registered
    pub async fn new(admin: Arc<AdminService>, config: WorkerConfig) -> Result<Self, AppError> {
        let mut executor = JobExecutor::new(Duration::from_secs(config.job_timeout_seconds));
        executor.register(Arc::new(VerifyProtectionJobHandler::new(admin.clone())));
        executor.register(Arc::new(EmergencyBackupJobHandler::new(admin.clone())));
        executor.register(Arc::new(SnapshotBackupJobHandler::new(admin.clone())));
        executor.register(Arc::new(DisasterBackupJobHandler::new(admin)));

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            executor: Arc::new(executor),
            config,
        })
    }

    /// Register all default scheduled tasks
    pub async fn register_default_tasks(&self) -> Result<(), AppError> {
        self.register_task(VERIFY_PROTECTION, &self.config.verify_schedule)
            .await?;
        self.register_task(EMERGENCY_BACKUP, &self.config.emergency_schedule)
            .await?;
        self.register_task(SNAPSHOT_BACKUP, &self.config.snapshot_schedule)
            .await?;
        self.register_task(DISASTER_BACKUP, &self.config.disaster_schedule)
            .await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Job executor shared with the fired tasks
    pub fn executor(&self) -> Arc<JobExecutor> {
        Arc::clone(&self.executor)
    }

    /// Runs `job_type` on `schedule`; failures are logged by the executor
    async fn register_task(&self, job_type: &'static str, schedule: &str) -> Result<(), AppError> {
        let executor = Arc::clone(&self.executor);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let executor = Arc::clone(&executor);
            Box::pin(async move {
                let _ = executor.execute(job_type).await;
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid schedule '{}' for {}: {}",
                schedule, job_type, e
            ))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {} job: {}", job_type, e)))?;

        tracing::info!(job_type, schedule, "Registered scheduled task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkeeper_core::config::AppConfig;
    use vaultkeeper_core::error::ErrorKind;
    use vaultkeeper_database::MemoryRecordStore;
    use vaultkeeper_service::ServiceContainer;

    async fn admin(root: &std::path::Path) -> Arc<AdminService> {
        let config = AppConfig::with_data_root(root.to_string_lossy());
        let records = Arc::new(MemoryRecordStore::new(config.database.tables.clone()));
        ServiceContainer::build(config, records).await.unwrap().admin
    }

    #[tokio::test]
    async fn test_default_tasks_register() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = CronScheduler::new(admin(dir.path()).await, WorkerConfig::default())
            .await
            .unwrap();

        scheduler.register_default_tasks().await.unwrap();
        assert_eq!(
            scheduler.executor().registered_types(),
            vec![DISASTER_BACKUP, EMERGENCY_BACKUP, SNAPSHOT_BACKUP, VERIFY_PROTECTION]
        );
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            snapshot_schedule: "every hour".to_string(),
            ..WorkerConfig::default()
        };
        let scheduler = CronScheduler::new(admin(dir.path()).await, config).await.unwrap();

        let err = scheduler.register_default_tasks().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.message.contains(SNAPSHOT_BACKUP));
    }
}
