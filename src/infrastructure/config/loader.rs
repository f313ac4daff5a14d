use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding the project configuration files.
pub const CONFIG_DIR: &str = ".kernelwatch";
/// Prefix of environment overrides, e.g. `KERNELWATCH_BUILD__TIMEOUT_SECS`.
pub const ENV_PREFIX: &str = "KERNELWATCH_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Build script path cannot be empty")]
    EmptyScript,

    #[error("Invalid timeout_secs: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Invalid logs.retain: {0}. Must be at least 1")]
    InvalidRetention(usize),

    #[error("Invalid notifier.max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error("Invalid notifier.timeout_secs: {0}. Must be positive")]
    InvalidNotifierTimeout(u64),

    #[error("Notifier is enabled but notifier.address is empty")]
    MissingNotifierAddress,

    #[error("Image file name cannot be empty")]
    EmptyImageFileName,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .kernelwatch/config.yaml (project config)
    /// 3. .kernelwatch/local.yaml (machine-local overrides, optional)
    /// 4. Environment variables (KERNELWATCH_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`load`](Self::load) with the config directory under `base`.
    pub fn load_from_dir(base: impl AsRef<Path>) -> Result<Config> {
        let dir = base.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file (environment overrides still apply)
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.build.script.as_os_str().is_empty() {
            return Err(ConfigError::EmptyScript);
        }
        if config.build.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.build.timeout_secs));
        }

        if config.artifacts.image_file_name.trim().is_empty() {
            return Err(ConfigError::EmptyImageFileName);
        }

        if config.logs.retain == 0 {
            return Err(ConfigError::InvalidRetention(config.logs.retain));
        }

        if config.notifier.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.notifier.max_attempts));
        }
        if config.notifier.timeout_secs == 0 {
            return Err(ConfigError::InvalidNotifierTimeout(
                config.notifier.timeout_secs,
            ));
        }
        if config.notifier.enabled && config.notifier.address.trim().is_empty() {
            return Err(ConfigError::MissingNotifierAddress);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
