//! Configuration storage operations

use crate::{models::Config, Error, Result};
use std::path::PathBuf;

pub struct ConfigStorage {
    config_dir: PathBuf,
}

impl ConfigStorage {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Loads `config.json`, writing defaults back when it is missing or empty.
    pub fn load(&self) -> Result<Config> {
        let config_path = self.config_dir.join("config.json");

        if !config_path.exists() {
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;

        if content.trim().is_empty() {
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let config: Config = serde_json::from_str(&content)?;
        config.validate().map_err(|e| match e {
            Error::Validation(reason) => Error::InvalidConfig {
                path: config_path,
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;

        let config_path = self.config_dir.join("config.json");
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }
}
