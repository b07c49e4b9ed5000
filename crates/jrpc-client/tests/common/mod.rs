//! In-test local server speaking the framed command protocol.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use jrpc_client::LocalClient;
use jrpc_core::{CommandOp, Frame, FrameCodec, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

/// Serves JSON-RPC frames until the client hangs up.
///
/// Every decoded request envelope is forwarded on `seen`. `handler` returns
/// the raw reply body, or `None` to leave the call unanswered.
pub async fn serve<S, F>(stream: S, seen: mpsc::UnboundedSender<Value>, mut handler: F)
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&Value) -> Option<Vec<u8>>,
{
    let mut framed = Framed::new(stream, FrameCodec::new());

    while let Some(Ok(frame)) = framed.next().await {
        let request = JsonRpcRequest::from_payload(&frame.payload).unwrap();
        let envelope: Value = serde_json::from_slice(request.as_bytes()).unwrap();
        let reply = handler(&envelope);
        let _ = seen.send(envelope);

        if let Some(body) = reply {
            let payload = JsonRpcResponse::new(body).to_payload().unwrap();
            let frame = Frame::new(CommandOp::JsonRpcResponse.as_u8(), frame.rpc_id, payload);
            if framed.send(frame).await.is_err() {
                break;
            }
        }
    }
}

/// Client wired to a spawned in-memory server.
pub fn client_with_server<F>(handler: F) -> (LocalClient, mpsc::UnboundedReceiver<Value>)
where
    F: FnMut(&Value) -> Option<Vec<u8>> + Send + 'static,
{
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(serve(server_side, seen_tx, handler));

    (LocalClient::new(Handle::current(), client_side), seen_rx)
}
