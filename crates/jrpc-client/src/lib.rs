//! jrpc Client Library
//!
//! Issues JSON-RPC calls to the local server over a single persistent framed
//! connection, correlating every reply with the call that is waiting on it.

pub mod envelope;
pub mod error;

pub use error::{ClientError, Result};

use jrpc_core::{CommandOp, Connection, ConnectionState, JsonRpcResponse};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Client bound to one connection for its whole lifetime.
pub struct LocalClient {
    connection: Connection,
}

impl LocalClient {
    /// Create a client over an already-open stream. Background work runs on `handle`.
    pub fn new<S>(handle: Handle, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self {
            connection: Connection::new(stream, handle),
        }
    }

    /// Open a TCP connection to the local server.
    pub async fn connect(handle: Handle, host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ClientError::Connect)?;
        stream.set_nodelay(true).map_err(ClientError::Connect)?;

        info!("Connected to local server at {}:{}", host, port);
        Ok(Self::new(handle, stream))
    }

    /// Activate the connection and start reading replies. May only be called once.
    pub fn start(&self) -> Result<()> {
        self.connection.start()?;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Call `method` and wait for its reply.
    ///
    /// There is no deadline here; see [`LocalClient::call_with_timeout`].
    pub async fn call(&self, method: &str, params: Option<&Value>) -> Result<Value> {
        self.connection.ensure_active()?;

        let request = envelope::encode(method, params)?;
        let payload = request
            .to_payload()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        let (_, reply, rpc_id) = self
            .connection
            .write_rpc_request(CommandOp::JsonRpcRequest, payload)
            .await?;
        debug!(rpc_id, method, "Call completed");

        let response =
            JsonRpcResponse::from_payload(&reply).map_err(|e| ClientError::Protocol(e.to_string()))?;
        envelope::decode(&response)
    }

    /// [`LocalClient::call`] bounded by `timeout`. A timed out call is abandoned.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.call(method, params))
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    /// Close the connection, failing every pending call with `reason`.
    pub fn close_with_error(&self, reason: impl Into<String>) {
        self.connection.close_with_error(reason);
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub async fn wait_until_closed(&self) {
        self.connection.wait_until_closed().await;
    }

    /// One-shot blocking call: connect, call once, close.
    ///
    /// Builds its own runtime, so it must not be used from inside one.
    pub fn call_once(host: &str, port: u16, method: &str, params: Option<&Value>) -> Result<Value> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientError::Runtime)?;

        runtime.block_on(async {
            let client = LocalClient::connect(Handle::current(), host, port).await?;
            client.start()?;

            let result = client.call(method, params).await;

            client.close();
            client.wait_until_closed().await;
            result
        })
    }
}
