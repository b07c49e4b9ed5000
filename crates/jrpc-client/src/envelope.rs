//! JSON-RPC envelope codec
//!
//! Builds the `{"jsonrpc":"2.0","method":..,"params":..}` request body and
//! parses reply bodies into plain JSON values. Reply contents are not
//! validated beyond JSON syntax.

use jrpc_core::{JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    // Strict servers reject `"params": null`, so absent params drop the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

/// Encodes a call envelope.
pub fn encode(method: &str, params: Option<&Value>) -> Result<JsonRpcRequest> {
    if method.is_empty() {
        return Err(ClientError::InvalidMethod);
    }

    let bytes = serde_json::to_vec(&Envelope {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
    })?;
    Ok(JsonRpcRequest::new(bytes))
}

/// Decodes a reply payload into a JSON value.
pub fn decode(response: &JsonRpcResponse) -> Result<Value> {
    decode_bytes(response.as_bytes())
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}
