//! Configuration module for matricula-server.
//!
//! Handles loading configuration from a TOML file, CLI arguments, and
//! environment variables.

pub mod file;

use crate::config::file::FileConfig;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<FileConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.identity.code_low > config.identity.code_high {
        return Err(ConfigError::ValidationError(format!(
            "identity code range is inverted: {} > {}",
            config.identity.code_low, config.identity.code_high
        )));
    }
    if config.identity.email_domain.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "identity email_domain is empty".to_owned(),
        ));
    }
    if config.ops.token.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "ops token is empty".to_owned(),
        ));
    }
    if config.sweep.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "sweep concurrency must be at least 1".to_owned(),
        ));
    }
    if config.fees.enrollment_in_cents <= 0 {
        return Err(ConfigError::ValidationError(
            "enrollment fee must be positive".to_owned(),
        ));
    }
    Ok(())
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::tests::sample_config;

    #[test]
    fn sample_config_passes_validation() {
        let config = sample_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn inverted_code_range_is_rejected() {
        let mut config = sample_config();
        config.identity.code_low = 8000;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn empty_ops_token_is_rejected() {
        let mut config = sample_config();
        config.ops.token = "  ".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_sweep_concurrency_is_rejected() {
        let mut config = sample_config();
        config.sweep.concurrency = 0;
        assert!(validate(&config).is_err());
    }
}
