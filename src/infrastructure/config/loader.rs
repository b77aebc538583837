use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, MAX_DURATION_SECS};
use crate::domain::models::TransportKind;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid contributor_threshold: {0}. Must be at least 1")]
    InvalidContributorThreshold(usize),

    #[error("Invalid {field}: {value}. Must be at least 1")]
    ZeroDuration { field: &'static str, value: u64 },

    #[error("Invalid {field}: {value}. Must be at most {max}")]
    DurationTooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid max_backoff_factor: {0}. Must be at least 1")]
    InvalidBackoffFactor(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("sync.repository_url is required when the repository transport is enabled")]
    MissingRepositoryUrl,

    #[error("sync.endpoint is required when the direct transport is enabled")]
    MissingEndpoint,
}

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".fedsync";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "FEDSYNC_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging from the working directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fedsync/config.yaml (project config)
    /// 3. .fedsync/local.yaml (local overrides, optional)
    /// 4. Environment variables (FEDSYNC_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`Self::load`], rooted at `root` instead of the working directory
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
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

    /// Load configuration from a specific file, still honoring env overrides
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
        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        // Coordinator
        let coordinator = &config.coordinator;
        if coordinator.contributor_threshold == 0 {
            return Err(ConfigError::InvalidContributorThreshold(0));
        }
        duration_secs("coordinator.round_deadline_secs", coordinator.round_deadline_secs)?;
        duration_secs("coordinator.tick_interval_secs", coordinator.tick_interval_secs)?;
        if coordinator.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(0));
        }
        if coordinator.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(0));
        }

        // Contributor sync
        let sync = &config.sync;
        duration_secs("sync.poll_interval_secs", sync.poll_interval_secs)?;
        duration_secs("sync.call_timeout_secs", sync.call_timeout_secs)?;
        if let Some(secs) = sync.upload_interval_secs {
            duration_secs("sync.upload_interval_secs", secs)?;
        }
        if let Some(secs) = sync.download_interval_secs {
            duration_secs("sync.download_interval_secs", secs)?;
        }
        if sync.max_backoff_factor == 0 {
            return Err(ConfigError::InvalidBackoffFactor(0));
        }
        if sync.enabled {
            match sync.transport {
                TransportKind::Repository if sync.repository_url.trim().is_empty() => {
                    return Err(ConfigError::MissingRepositoryUrl);
                }
                TransportKind::Direct if sync.endpoint.trim().is_empty() => {
                    return Err(ConfigError::MissingEndpoint);
                }
                _ => {}
            }
        }

        // Retry
        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

fn duration_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroDuration { field, value })
    } else if value > MAX_DURATION_SECS {
        Err(ConfigError::DurationTooLarge {
            field,
            value,
            max: MAX_DURATION_SECS,
        })
    } else {
        Ok(())
    }
}
