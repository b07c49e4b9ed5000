use jrpc_core::ConnectionError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection is not active")]
    NotActive,

    #[error("Client already started")]
    AlreadyStarted,

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Method name cannot be empty")]
    InvalidMethod,

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<ConnectionError> for ClientError {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::NotActive(_) => ClientError::NotActive,
            ConnectionError::AlreadyStarted => ClientError::AlreadyStarted,
            ConnectionError::Closed(reason) => ClientError::ConnectionClosed(reason),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
