//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles environment detection,
//! layered file discovery and environment-variable overrides through the
//! `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::RelayConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "menu-events";
const ENV_PREFIX: &str = "MENU_EVENTS";

/// Detect the runtime environment from environment variables
pub fn detect_environment() -> String {
    env::var("MENU_EVENTS_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: RelayConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading relay configuration"
        );

        let mut config = Self::build_layers(&config_directory, environment)?;

        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.storage.database_url = database_url;
        }

        config.validate()?;

        info!(
            environment = %environment,
            broker_exchange = %config.broker.exchange,
            failure_table = %config.storage.failure_table,
            fallback_directory = %config.storage.fallback_directory.display(),
            "🔧 Relay configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: RelayConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn build_layers(directory: &Path, environment: &str) -> ConfigResult<RelayConfig> {
        let defaults = Config::try_from(&RelayConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_file = directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let env_file = directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        Ok(merged.try_deserialize::<RelayConfig>()?)
    }
}
