//! # Worker Configuration
//!
//! Runtime settings for the queue, the handlers and the caller-side merge
//! policy. Values are layered by [`ConfigLoader`]: built-in defaults, an
//! optional TOML file, then `PATIENT_WORKER_*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use patient_worker::config::{ConfigLoader, StaleResultPolicy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("config/worker.toml").load()?;
//! assert_eq!(config.stale_results, StaleResultPolicy::Drop);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::ConfigLoader;

use crate::constants::{
    DEFAULT_CACHE_TTL_MS, DEFAULT_EVENT_CAPACITY, DEFAULT_INBOUND_CAPACITY,
    DEFAULT_MAX_HISTORY_SIZE, MAX_CACHE_TTL_MS,
};
use crate::error::{Result, WorkerError};

/// What the caller-side merger does with a result for a superseded context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleResultPolicy {
    /// Ignore results whose context is no longer active
    #[default]
    Drop,
    /// Merge every result regardless of context
    Merge,
}

/// What happens when a single-record update names an id that is not present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMissPolicy {
    /// Report `NotFoundError` and leave state unchanged
    #[default]
    Error,
    /// Leave state unchanged without signalling
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache expiry window applied when data is added
    pub cache_ttl_ms: u64,

    /// Capacity of the inbound channel feeding the background worker
    pub inbound_capacity: usize,

    /// Capacity of the lifecycle event broadcast channel
    pub event_capacity: usize,

    /// Record dispatch executions for debugging
    pub enable_history: bool,

    /// Maximum number of dispatch executions kept in history
    pub max_history_size: usize,

    pub stale_results: StaleResultPolicy,

    pub update_miss: UpdateMissPolicy,

    /// Explicit tracing filter; falls back to the environment-derived level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            enable_history: true,
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            stale_results: StaleResultPolicy::default(),
            update_miss: UpdateMissPolicy::default(),
            log_level: None,
        }
    }
}

impl WorkerConfig {
    /// Defaults overlaid with `PATIENT_WORKER_*` environment variables
    pub fn from_env() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Cache expiry window, clamped to [`MAX_CACHE_TTL_MS`]
    pub fn cache_ttl(&self) -> chrono::Duration {
        let ttl_ms = self.cache_ttl_ms.min(MAX_CACHE_TTL_MS);
        chrono::Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(WorkerError::Configuration(
                "cache_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl_ms > MAX_CACHE_TTL_MS {
            return Err(WorkerError::Configuration(format!(
                "cache_ttl_ms must not exceed {MAX_CACHE_TTL_MS}"
            )));
        }
        if self.inbound_capacity == 0 {
            return Err(WorkerError::Configuration(
                "inbound_capacity must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(WorkerError::Configuration(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.enable_history && self.max_history_size == 0 {
            return Err(WorkerError::Configuration(
                "max_history_size must be greater than zero when history is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
