//! Configuration Loader
//!
//! Environment-aware loading: defaults, then `dispatcher.toml`, then
//! `dispatcher.{environment}.toml`, then `AGENT_WORKER__*` variables.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::DispatcherConfig;
use crate::constants::system;

const BASE_FILE_STEM: &str = "dispatcher";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DispatcherConfig,
    environment: String,
    sources: Vec<PathBuf>,
}

impl ConfigManager {
    /// Defaults plus environment variables only
    pub fn load() -> ConfigResult<Self> {
        Self::build(Vec::new(), &Self::detect_environment())
    }

    /// Load one explicit TOML file; the file must exist
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        if !path.is_file() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::build(vec![path.to_path_buf()], &Self::detect_environment())
    }

    /// Load `dispatcher.toml` and its environment overlay from a directory
    ///
    /// Both files are optional.
    pub fn load_from_directory_with_env(dir: &Path, environment: &str) -> ConfigResult<Self> {
        let candidates = [
            dir.join(format!("{BASE_FILE_STEM}.toml")),
            dir.join(format!("{BASE_FILE_STEM}.{environment}.toml")),
        ];
        let sources = candidates.into_iter().filter(|p| p.is_file()).collect();
        Self::build(sources, environment)
    }

    fn build(sources: Vec<PathBuf>, environment: &str) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        for source in &sources {
            builder = builder.add_source(config::File::from(source.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(system::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: DispatcherConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %environment,
            sources = ?sources,
            workers = config.workers,
            inbound_buffer_size = config.inbound_buffer_size,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            sources,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn into_config(self) -> DispatcherConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Files that contributed, in load order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// `AGENT_WORKER_ENV`, then `APP_ENV`, else `development`
    pub fn detect_environment() -> String {
        std::env::var("AGENT_WORKER_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "workers = 6\nsuppress_startup_notification = true\n").unwrap();

        let manager = ConfigManager::load_file(&path).unwrap();
        assert_eq!(manager.config().workers, 6);
        assert!(manager.config().suppress_startup_notification);
        assert_eq!(manager.config().inbound_buffer_size, 32);
        assert_eq!(manager.sources(), &[path]);
    }

    #[test]
    fn test_load_file_missing() {
        let err = ConfigManager::load_file(Path::new("/nonexistent/dispatcher.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }

    #[test]
    fn test_environment_overlay() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dispatcher.toml"), "workers = 3\ninbound_buffer_size = 8\n").unwrap();
        fs::write(dir.path().join("dispatcher.test.toml"), "workers = 5\n").unwrap();

        let manager = ConfigManager::load_from_directory_with_env(dir.path(), "test").unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().workers, 5);
        assert_eq!(manager.config().inbound_buffer_size, 8);

        let production = ConfigManager::load_from_directory_with_env(dir.path(), "production").unwrap();
        assert_eq!(production.config().workers, 3);
    }

    #[test]
    fn test_empty_directory_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_from_directory_with_env(dir.path(), "test").unwrap();
        assert_eq!(manager.into_config(), DispatcherConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dispatcher.toml"), "workers = 1\n").unwrap();

        let err = ConfigManager::load_from_directory_with_env(dir.path(), "test").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
