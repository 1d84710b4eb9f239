//! Vaultkeeper server: artifact protection and disaster recovery
//!
//! Main entry point that wires all crates together and runs the
//! scheduled protection and backup jobs until shutdown.

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use vaultkeeper_core::config::AppConfig;
use vaultkeeper_core::error::AppError;
use vaultkeeper_service::ServiceContainer;
use vaultkeeper_worker::CronScheduler;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("VAULTKEEPER_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    AppConfig::load(&config_path)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Vaultkeeper v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Record store ─────────────────────────────────────
    tracing::info!("Connecting record store...");
    let records = vaultkeeper_database::connect_record_store(&config.database).await?;

    // ── Step 2: Services ─────────────────────────────────────────
    let worker_config = config.worker.clone();
    let services = ServiceContainer::build(config, records).await?;

    let audit = services.admin.audit_integrity().await?;
    if audit.missing.is_empty() {
        tracing::info!(registered = audit.total, "Registry matches the content store");
    } else {
        tracing::warn!(
            registered = audit.total,
            missing = audit.missing.len(),
            "Registered files missing from the content store"
        );
    }

    // ── Step 3: Scheduler ────────────────────────────────────────
    let scheduler = if worker_config.enabled {
        let scheduler = CronScheduler::new(services.admin.clone(), worker_config).await?;
        scheduler.register_default_tasks().await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Scheduler disabled; running without periodic jobs");
        None
    };

    // ── Step 4: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    if let Some(operation) = services.guard.current() {
        tracing::warn!(operation = %operation, "Waiting for running operation to finish");
        drop(services.guard.begin("shutdown").await?);
    }

    tracing::info!("Vaultkeeper stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
