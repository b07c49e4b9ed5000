pub mod config;

pub use config::{Config, LocalServerConfig, DEFAULT_LOCAL_SERVER_PORT};
