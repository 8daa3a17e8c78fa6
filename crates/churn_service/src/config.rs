//! Service configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `CHURN_*` environment variables (e.g. `CHURN_ARTIFACT_PATH`).

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/churn-service.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CHURN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Model artifact produced by the trainer
    pub artifact_path: PathBuf,
    /// Feature schema document bound to the artifact at startup
    pub schema_path: PathBuf,
    /// Largest accepted batch
    pub max_batch_size: usize,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
    /// Exit non-zero when the model fails to load instead of serving not-ready
    pub exit_on_load_failure: bool,
    pub log_level: String,
    /// `pretty` or `compact`
    pub log_format: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            artifact_path: PathBuf::from("models/churn-model.json"),
            schema_path: PathBuf::from("models/schema.json"),
            max_batch_size: 1024,
            request_timeout_ms: 5_000,
            max_body_bytes: 2 * 1024 * 1024,
            exit_on_load_failure: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; otherwise [`DEFAULT_CONFIG_PATH`] is
    /// used only if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        };

        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = &resolved {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_address must not be empty".into()));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be at least 1".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be at least 1".into()));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "compact") {
            return Err(ConfigError::Invalid(format!(
                "unknown log_format '{}', expected pretty or compact",
                self.log_format
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.exit_on_load_failure);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "bind_address = \"0.0.0.0:9000\"\nmax_batch_size = 16\nexit_on_load_failure = false"
        )
        .unwrap();

        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.max_batch_size, 16);
        assert!(!config.exit_on_load_failure);
        // untouched keys keep their defaults
        assert_eq!(config.schema_path, PathBuf::from("models/schema.json"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = ServiceConfig::load(Some(Path::new("/nonexistent/churn.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = ServiceConfig {
            max_batch_size: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ServiceConfig {
            log_format: "xml".into(),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
