use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::RuntimeConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl RuntimeConfig {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/weft/config.toml` on Unix/macOS, or the platform
    /// equivalent via `dirs::config_dir()`. Falls back to the current
    /// directory if no config dir is available.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("weft").join("config.toml")
    }

    /// Loads configuration from the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `RuntimeConfig::default()`.
    /// - Otherwise parses it as TOML and validates it.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(RuntimeConfig::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: RuntimeConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - Router locations are absolute (start with `/`)
    /// - The not-found and error locations are distinct
    /// - At least one redirect is allowed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let router = &self.router;
        for (field, value) in [
            ("root", &router.root),
            ("not_found_path", &router.not_found_path),
            ("error_path", &router.error_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::ValidationError {
                    message: format!("router.{} must start with '/', got '{}'", field, value),
                });
            }
        }

        if router.not_found_path == router.error_path {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "router.not_found_path and router.error_path must differ (both '{}')",
                    router.error_path
                ),
            });
        }

        if router.max_redirects == 0 {
            return Err(ConfigError::ValidationError {
                message: "router.max_redirects must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
