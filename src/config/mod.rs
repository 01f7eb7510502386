//! # Configuration
//!
//! Dispatcher sizing and feature switches. Values come from built-in
//! defaults, an optional TOML file and `AGENT_WORKER__*` environment
//! variables, in that order of precedence.
//!
//! ```toml
//! workers = 4
//! inbound_buffer_size = 64
//! suppress_startup_notification = false
//! enable_builtin_providers = true
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::constants::system;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Runtime configuration of a [`Dispatcher`](crate::execution::dispatcher::Dispatcher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Inbound queue capacity
    pub inbound_buffer_size: usize,
    /// Skip the `asset-ready` push at startup
    pub suppress_startup_notification: bool,
    /// Register the `store`, `vdr` and `messaging` providers
    pub enable_builtin_providers: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: system::MIN_WORKERS,
            inbound_buffer_size: system::DEFAULT_INBOUND_BUFFER_SIZE,
            suppress_startup_notification: false,
            enable_builtin_providers: true,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers < system::MIN_WORKERS {
            return Err(ConfigurationError::invalid_value(
                "workers",
                self.workers,
                format!("at least {} workers are required", system::MIN_WORKERS),
            ));
        }
        if self.inbound_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "inbound_buffer_size",
                self.inbound_buffer_size,
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_inbound_buffer_size(mut self, size: usize) -> Self {
        self.inbound_buffer_size = size;
        self
    }

    pub fn without_startup_notification(mut self) -> Self {
        self.suppress_startup_notification = true;
        self
    }

    pub fn without_builtin_providers(mut self) -> Self {
        self.enable_builtin_providers = false;
        self
    }
}
