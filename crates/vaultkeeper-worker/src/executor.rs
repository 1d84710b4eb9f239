//! Job executor: dispatches named jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use vaultkeeper_core::error::{AppError, ErrorKind};

/// Trait for job handler implementations
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// Get the job type this handler processes
    fn job_type(&self) -> &str;

    /// Run the job once, returning a JSON report
    async fn execute(&self) -> Result<Value, JobExecutionError>;
}

/// Error from job execution
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure; the next run will fail the same way
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure; the next scheduled run may succeed
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// The run exceeded its deadline
    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Classifies a service error. Another operation holding the guard is
    /// transient; everything else is carried as-is.
    pub fn from_service(err: AppError) -> Self {
        match err.kind {
            ErrorKind::Conflict => Self::Transient(err.message),
            _ => Self::Internal(err),
        }
    }
}

/// Dispatches jobs to the appropriate handler based on job type
#[derive(Debug)]
pub struct JobExecutor {
    /// Registered job handlers by type
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    /// Deadline applied to every run
    timeout: Duration,
}

impl JobExecutor {
    /// Create a new job executor with the given per-run deadline
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Register a job handler
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        tracing::info!("Registered job handler for type '{}'", job_type);
        self.handlers.insert(job_type, handler);
    }

    /// Run a job by type, bounded by the executor deadline
    pub async fn execute(&self, job_type: &str) -> Result<Value, JobExecutionError> {
        let handler = self.handlers.get(job_type).ok_or_else(|| {
            JobExecutionError::Permanent(format!(
                "No handler registered for job type '{}'",
                job_type
            ))
        })?;

        tracing::info!(job_type, timeout_secs = self.timeout.as_secs(), "Executing job");
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, handler.execute()).await {
            Ok(result) => result,
            Err(_) => Err(JobExecutionError::TimedOut(self.timeout)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => tracing::info!(job_type, elapsed_ms, report = %report, "Job completed"),
            Err(JobExecutionError::Transient(reason)) => {
                tracing::warn!(job_type, elapsed_ms, reason = %reason, "Job skipped")
            }
            Err(e) => tracing::error!(job_type, elapsed_ms, error = %e, "Job failed"),
        }
        result
    }

    /// Check if a handler is registered for a job type
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Get the sorted list of registered job types
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct SleepyHandler(Duration);

    #[async_trait]
    impl JobHandler for SleepyHandler {
        fn job_type(&self) -> &str {
            "sleepy"
        }

        async fn execute(&self) -> Result<Value, JobExecutionError> {
            tokio::time::sleep(self.0).await;
            Ok(json!({ "slept_ms": self.0.as_millis() as u64 }))
        }
    }

    #[derive(Debug)]
    struct BusyHandler;

    #[async_trait]
    impl JobHandler for BusyHandler {
        fn job_type(&self) -> &str {
            "busy"
        }

        async fn execute(&self) -> Result<Value, JobExecutionError> {
            Err(JobExecutionError::from_service(AppError::conflict(
                "Cannot start snapshot backup: disaster-recovery restore is in progress",
            )))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_within_deadline_returns_report() {
        let mut executor = JobExecutor::new(Duration::from_secs(60));
        executor.register(Arc::new(SleepyHandler(Duration::from_secs(5))));

        let report = executor.execute("sleepy").await.unwrap();
        assert_eq!(report["slept_ms"], 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_past_deadline_times_out() {
        let mut executor = JobExecutor::new(Duration::from_secs(1));
        executor.register(Arc::new(SleepyHandler(Duration::from_secs(30))));

        let err = executor.execute("sleepy").await.unwrap_err();
        assert!(matches!(err, JobExecutionError::TimedOut(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_permanent() {
        let executor = JobExecutor::new(Duration::from_secs(1));
        let err = executor.execute("nope").await.unwrap_err();
        assert!(matches!(err, JobExecutionError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_guard_conflict_is_transient() {
        let mut executor = JobExecutor::new(Duration::from_secs(1));
        executor.register(Arc::new(BusyHandler));

        assert!(executor.has_handler("busy"));
        let err = executor.execute("busy").await.unwrap_err();
        match err {
            JobExecutionError::Transient(reason) => assert!(reason.contains("in progress")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_other_service_errors_stay_internal() {
        let err = JobExecutionError::from_service(AppError::storage_write_failed("disk full"));
        assert!(matches!(err, JobExecutionError::Internal(e) if e.kind == ErrorKind::StorageWriteFailed));
    }
}
