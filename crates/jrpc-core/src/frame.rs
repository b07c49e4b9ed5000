//! Length-prefixed frame codec for the local command connection.
//!
//! Every frame on the wire is laid out as
//! `[len: u32 BE][op: u8][rpc_id: u64 BE][payload]`, where `len` counts the
//! op byte, the rpc id and the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest accepted frame body (op + rpc id + payload).
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

const LEN_PREFIX: usize = 4;
const HEADER_LEN: usize = 1 + 8;

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub op: u8,
    /// Zero for non-RPC frames.
    pub rpc_id: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(op: u8, rpc_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            op,
            rpc_id,
            payload: payload.into(),
        }
    }

    pub fn is_rpc(&self) -> bool {
        self.rpc_id != 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {0} bytes (max {MAX_FRAME_LEN})")]
    TooLarge(usize),

    #[error("Frame too short: {0} bytes")]
    TooShort(usize),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        if len < HEADER_LEN {
            return Err(FrameError::TooShort(len));
        }

        let total = LEN_PREFIX + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let op = src.get_u8();
        let rpc_id = src.get_u64();
        let payload = src.split_to(len - HEADER_LEN).freeze();

        Ok(Some(Frame {
            op,
            rpc_id,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = HEADER_LEN + frame.payload.len();
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }

        dst.reserve(LEN_PREFIX + len);
        dst.put_u32(len as u32);
        dst.put_u8(frame.op);
        dst.put_u64(frame.rpc_id);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
