//! Core building blocks for talking to a local JSON-RPC server: frame codec,
//! command ops, the connection state machine and the correlating framed
//! connection, plus the shared configuration model.

pub mod command;
pub mod connection;
pub mod error;
pub mod frame;
pub mod models;
pub mod state;
pub mod storage;

pub use command::{CommandOp, JsonRpcRequest, JsonRpcResponse, PayloadError};
pub use connection::{Connection, ConnectionError};
pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec, FrameError};
pub use state::ConnectionState;
