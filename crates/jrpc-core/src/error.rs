//! Error types for configuration and storage

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid config {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("Could not find {0} directory")]
    MissingDir(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
