//! Local command ops and their payloads.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Command operation carried in the op byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandOp {
    Ping = 0,
    Pong = 1,
    JsonRpcRequest = 2,
    JsonRpcResponse = 3,
}

impl CommandOp {
    /// Op the peer answers with when this op is sent as an RPC request.
    pub fn response_op(self) -> Option<CommandOp> {
        match self {
            CommandOp::JsonRpcRequest => Some(CommandOp::JsonRpcResponse),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandOp {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(CommandOp::Ping),
            1 => Ok(CommandOp::Pong),
            2 => Ok(CommandOp::JsonRpcRequest),
            3 => Ok(CommandOp::JsonRpcResponse),
            other => Err(other),
        }
    }
}

impl fmt::Display for CommandOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandOp::Ping => "ping",
            CommandOp::Pong => "pong",
            CommandOp::JsonRpcRequest => "json_rpc_request",
            CommandOp::JsonRpcResponse => "json_rpc_response",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Payload truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Payload has {0} trailing bytes")]
    Trailing(usize),

    #[error("Payload too large: {0} bytes")]
    TooLarge(usize),
}

/// Serialized JSON-RPC request envelope sent under [`CommandOp::JsonRpcRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcRequest {
    bytes: Bytes,
}

/// Serialized reply payload received under [`CommandOp::JsonRpcResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcResponse {
    bytes: Bytes,
}

impl JsonRpcRequest {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_payload(&self) -> Result<Bytes, PayloadError> {
        write_prefixed(&self.bytes)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        read_prefixed(payload).map(Self::new)
    }
}

impl JsonRpcResponse {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_payload(&self) -> Result<Bytes, PayloadError> {
        write_prefixed(&self.bytes)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        read_prefixed(payload).map(Self::new)
    }
}

// Payloads carry their body behind a u32 BE length prefix.
fn write_prefixed(body: &[u8]) -> Result<Bytes, PayloadError> {
    let len = u32::try_from(body.len()).map_err(|_| PayloadError::TooLarge(body.len()))?;
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(len);
    buf.put_slice(body);
    Ok(buf.freeze())
}

fn read_prefixed(payload: &[u8]) -> Result<Bytes, PayloadError> {
    if payload.len() < 4 {
        return Err(PayloadError::Truncated {
            expected: 4,
            actual: payload.len(),
        });
    }

    let len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let body = &payload[4..];
    if body.len() < len {
        return Err(PayloadError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }
    if body.len() > len {
        return Err(PayloadError::Trailing(body.len() - len));
    }

    Ok(Bytes::copy_from_slice(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_codes() {
        assert_eq!(CommandOp::JsonRpcRequest.as_u8(), 2);
        assert_eq!(CommandOp::try_from(3), Ok(CommandOp::JsonRpcResponse));
        assert_eq!(CommandOp::try_from(42), Err(42));
    }

    #[test]
    fn test_response_op() {
        assert_eq!(
            CommandOp::JsonRpcRequest.response_op(),
            Some(CommandOp::JsonRpcResponse)
        );
        assert_eq!(CommandOp::Ping.response_op(), None);
        assert_eq!(CommandOp::JsonRpcResponse.response_op(), None);
    }

    #[test]
    fn test_request_payload_is_length_prefixed() {
        let request = JsonRpcRequest::new(&b"{}"[..]);
        let payload = request.to_payload().unwrap();

        assert_eq!(&payload[..], &[0, 0, 0, 2, b'{', b'}']);
        assert_eq!(JsonRpcRequest::from_payload(&payload).unwrap(), request);
    }

    #[test]
    fn test_truncated_payload() {
        let err = JsonRpcResponse::from_payload(&[0, 0, 0, 5, b'x']).unwrap_err();
        assert_eq!(
            err,
            PayloadError::Truncated {
                expected: 5,
                actual: 1
            }
        );

        let err = JsonRpcResponse::from_payload(&[0, 0]).unwrap_err();
        assert!(matches!(err, PayloadError::Truncated { expected: 4, .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = JsonRpcResponse::from_payload(&[0, 0, 0, 1, b'x', b'y']).unwrap_err();
        assert_eq!(err, PayloadError::Trailing(1));
    }
}
