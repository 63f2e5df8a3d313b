//! Validator configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LINCHECK_*` environment variables. Command-line flags are applied on top
//! by the binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LincheckError, LincheckResult};
use crate::linearizability::MAX_SUBSET_BITS;

pub mod defaults;

pub use defaults::*;

/// Root configuration for a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Operations log to validate
    pub log_path: PathBuf,

    /// Resolver cutoff: more ambiguous operations than this are refused
    pub max_ambiguous_operations: usize,

    /// Worker threads used for parallel checking
    pub workers: usize,

    /// Check partitions and candidate subsets in parallel
    pub parallel: bool,

    /// Default log level when RUST_LOG is unset
    pub log_level: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            max_ambiguous_operations: DEFAULT_MAX_AMBIGUOUS_OPERATIONS,
            workers: default_workers(),
            parallel: DEFAULT_PARALLEL,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ValidatorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> LincheckResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> LincheckResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            LincheckError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut config: ValidatorConfig = toml::from_str(&contents)
            .map_err(|e| LincheckError::ConfigError(format!("Failed to parse TOML: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LINCHECK_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> LincheckResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> LincheckResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_LOG_PATH) {
            self.log_path = PathBuf::from(path);
        }
        if let Some(val) = lookup(ENV_MAX_AMBIGUOUS) {
            self.max_ambiguous_operations = val.parse().map_err(|_| {
                LincheckError::ConfigError(format!("Invalid {}: {}", ENV_MAX_AMBIGUOUS, val))
            })?;
        }
        if let Some(val) = lookup(ENV_WORKERS) {
            self.workers = val.parse().map_err(|_| {
                LincheckError::ConfigError(format!("Invalid {}: {}", ENV_WORKERS, val))
            })?;
        }
        if let Some(val) = lookup(ENV_PARALLEL) {
            self.parallel = val.parse().map_err(|_| {
                LincheckError::ConfigError(format!("Invalid {}: {}", ENV_PARALLEL, val))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> LincheckResult<()> {
        if self.max_ambiguous_operations > MAX_SUBSET_BITS {
            return Err(LincheckError::ConfigError(format!(
                "max_ambiguous_operations must be at most {}, got {}",
                MAX_SUBSET_BITS, self.max_ambiguous_operations
            )));
        }

        if self.workers == 0 {
            return Err(LincheckError::ConfigError(
                "workers must be at least 1".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(LincheckError::ConfigError(format!(
                "Invalid log_level: {}",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Builder for ValidatorConfig
pub struct ValidatorConfigBuilder {
    config: ValidatorConfig,
}

impl ValidatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    pub fn max_ambiguous_operations(mut self, limit: usize) -> Self {
        self.config.max_ambiguous_operations = limit;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn build(self) -> LincheckResult<ValidatorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ValidatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
