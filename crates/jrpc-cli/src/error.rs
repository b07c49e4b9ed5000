/// Invalid invocation, reported before any connection is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("method must be specified")]
    MissingMethod,

    #[error("Invalid --params JSON: {0}")]
    InvalidParams(#[source] serde_json::Error),

    #[error("Interval must be a non-negative number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("Config error: {0}")]
    Config(#[from] jrpc_core::Error),
}
