use clap::Parser;
use jrpc_core::models::Config;
use jrpc_core::storage::{init_config_dir, ConfigStorage};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::Invocation;
use crate::error::ConfigurationError;

#[derive(Parser, Debug)]
#[command(name = "jrpc")]
#[command(about = "Call a JSON-RPC method on the local server", long_about = None)]
pub struct Args {
    /// Local server port [default: from config]
    #[arg(long, alias = "local_port")]
    pub port: Option<u16>,

    /// Local server host [default: from config]
    #[arg(long)]
    pub host: Option<String>,

    /// JSON-RPC method to call
    #[arg(short, long)]
    pub method: Option<String>,

    /// Number of calls to make
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub times: u32,

    /// Seconds to wait between calls
    #[arg(long, default_value_t = 2.0)]
    pub interval: f64,

    /// Call params as a JSON string
    #[arg(long)]
    pub params: Option<String>,

    /// Log level [default: from config]
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Directory holding config.json
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

/// Flag values that can be checked without loading the config.
struct CheckedFlags {
    method: String,
    params: Option<Value>,
    interval: Duration,
}

impl Args {
    fn check_flags(&self) -> Result<CheckedFlags, ConfigurationError> {
        let method = self
            .method
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or(ConfigurationError::MissingMethod)?;

        let params = self
            .params
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(ConfigurationError::InvalidParams)?;

        // Rejects negative, non-finite and out-of-range values alike.
        let interval = Duration::try_from_secs_f64(self.interval)
            .map_err(|_| ConfigurationError::InvalidInterval(self.interval))?;

        Ok(CheckedFlags {
            method,
            params,
            interval,
        })
    }

    /// Validates the flags and merges them over `config`.
    pub fn resolve(&self, config: &Config) -> Result<Invocation, ConfigurationError> {
        let flags = self.check_flags()?;
        self.merge(flags, config)
    }

    /// Checks the flags first, then loads the config and merges the two.
    ///
    /// Flag errors never touch the config file.
    pub fn load_invocation(&self) -> Result<Invocation, ConfigurationError> {
        let flags = self.check_flags()?;
        let config = load_config(self.config_dir.as_deref())?;
        self.merge(flags, &config)
    }

    fn merge(&self, flags: CheckedFlags, config: &Config) -> Result<Invocation, ConfigurationError> {
        let mut config = config.clone();
        if let Some(host) = &self.host {
            config.local_server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.local_server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate()?;

        Ok(Invocation {
            host: config.local_server.host,
            port: config.local_server.port,
            method: flags.method,
            params: flags.params,
            times: self.times,
            interval: flags.interval,
            log_level: config.log_level,
        })
    }
}

/// Loads config.json from `config_dir`, or from the platform config dir.
pub fn load_config(config_dir: Option<&Path>) -> Result<Config, ConfigurationError> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => init_config_dir()?,
    };
    Ok(ConfigStorage::new(dir).load()?)
}
