//! Client configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Port the local JSON-RPC server listens on unless configured otherwise.
pub const DEFAULT_LOCAL_SERVER_PORT: u16 = 38391;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    pub local_server: LocalServerConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.local_server.validate()?;

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            local_server: LocalServerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl LocalServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation("Host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(Error::Validation("Port must be greater than 0".to_string()));
        }

        Ok(())
    }
}

impl Default for LocalServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_LOCAL_SERVER_PORT,
        }
    }
}
