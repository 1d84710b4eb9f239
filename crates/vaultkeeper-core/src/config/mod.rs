//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a default so a sparse file is valid.

pub mod backup;
pub mod database;
pub mod logging;
pub mod protection;
pub mod storage;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::backup::{DisasterRecoveryConfig, SnapshotConfig};
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::protection::ProtectionConfig;
pub use self::storage::StorageConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection and protected table set.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Data directory layout.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Redundant copy locations.
    #[serde(default)]
    pub protection: ProtectionConfig,
    /// Directory snapshot settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Disaster-recovery artifact settings.
    #[serde(default)]
    pub disaster_recovery: DisasterRecoveryConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// The file is optional; environment variables prefixed with
    /// `VAULTKEEPER__` (double underscore as separator) override it.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VAULTKEEPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn parse(toml: &str) -> Result<Self, AppError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Default configuration with every data directory under `data_root`.
    pub fn with_data_root(data_root: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.storage.data_root = data_root.into();
        config
    }
}
