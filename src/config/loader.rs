//! Configuration Loader
//!
//! Layered loading with the `config` crate. Later sources win:
//! defaults, then the TOML file, then environment variables.

use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use super::WorkerConfig;
use crate::constants::ENV_PREFIX;
use crate::error::{Result, WorkerError};

/// Default config file looked up relative to the working directory
const DEFAULT_CONFIG_FILE: &str = "config/worker";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_overrides: None,
        }
    }

    /// Load from an explicit file, which must then exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Use this map instead of the process environment
    ///
    /// Keeps tests independent of each other's environment variables.
    pub fn with_env_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    pub fn load(&self) -> Result<WorkerConfig> {
        let defaults = Config::try_from(&WorkerConfig::default()).map_err(config_error)?;

        let file_source = match &self.file {
            Some(path) => File::from(path.clone()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let environment = Environment::with_prefix(&self.env_prefix)
            .try_parsing(true)
            .source(self.env_overrides.clone());

        let config: WorkerConfig = Config::builder()
            .add_source(defaults)
            .add_source(file_source)
            .add_source(environment)
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        config.validate()?;

        debug!(
            file = ?self.file,
            env_prefix = %self.env_prefix,
            cache_ttl_ms = config.cache_ttl_ms,
            inbound_capacity = config.inbound_capacity,
            stale_results = ?config.stale_results,
            update_miss = ?config.update_miss,
            "Configuration loaded"
        );

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn config_error(err: config::ConfigError) -> WorkerError {
    WorkerError::Configuration(err.to_string())
}
