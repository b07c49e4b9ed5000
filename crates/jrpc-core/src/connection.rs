//! Framed connection with request/response correlation.
//!
//! A [`Connection`] owns both halves of a byte stream. Outgoing RPC requests
//! get a fresh rpc id and a pending record in the correlation table; the read
//! loop routes each inbound reply to the caller waiting on that id. Closing
//! the connection sweeps the table so no caller is left waiting.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{CommandOp, PayloadError};
use crate::frame::{Frame, FrameCodec, FrameError};
use crate::state::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection is not active (state: {0})")]
    NotActive(ConnectionState),

    #[error("Connection already started")]
    AlreadyStarted,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Unexpected reply op: expected {expected}, got {actual}")]
    UnexpectedOp {
        expected: CommandOp,
        actual: CommandOp,
    },

    #[error("Unknown command op {0}")]
    UnknownOp(u8),

    #[error("Op {0} is not an RPC request op")]
    NotRpcOp(CommandOp),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;
type ReplySender = oneshot::Sender<Result<Frame>>;

const CLOSED_BY_PEER: &str = "connection closed by peer";
const CLOSED_LOCALLY: &str = "connection closed";

/// Most abandoned ids remembered at once; the oldest are forgotten first.
const MAX_ABANDONED: usize = 1024;

/// Correlation table: rpc id -> waiting caller.
#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, ReplySender>,
    /// Ids whose caller gave up before the reply arrived. Ids grow
    /// monotonically, so the smallest entry is the oldest.
    abandoned: BTreeSet<u64>,
    /// Set by the closure sweep; no inserts are accepted afterwards.
    closed: Option<String>,
}

enum Routed {
    Delivered,
    Abandoned,
    Unknown,
}

impl PendingTable {
    fn insert(&mut self, rpc_id: u64, tx: ReplySender) -> Result<()> {
        if let Some(reason) = &self.closed {
            return Err(ConnectionError::Closed(reason.clone()));
        }
        self.calls.insert(rpc_id, tx);
        Ok(())
    }

    fn resolve(&mut self, frame: Frame) -> Routed {
        match self.calls.remove(&frame.rpc_id) {
            Some(tx) => {
                let _ = tx.send(Ok(frame));
                Routed::Delivered
            }
            None if self.abandoned.remove(&frame.rpc_id) => Routed::Abandoned,
            None => Routed::Unknown,
        }
    }

    /// Drops a record whose request never reached the wire.
    fn forget(&mut self, rpc_id: u64) {
        self.calls.remove(&rpc_id);
    }

    fn abandon(&mut self, rpc_id: u64) {
        if self.calls.remove(&rpc_id).is_some() && self.closed.is_none() {
            self.abandoned.insert(rpc_id);
            if self.abandoned.len() > MAX_ABANDONED {
                if let Some(oldest) = self.abandoned.pop_first() {
                    trace!(rpc_id = oldest, "Forgot oldest abandoned call");
                }
            }
        }
    }

    fn sweep(&mut self, reason: &str) -> usize {
        self.closed = Some(reason.to_string());
        self.abandoned.clear();

        let count = self.calls.len();
        for (_, tx) in self.calls.drain() {
            let _ = tx.send(Err(ConnectionError::Closed(reason.to_string())));
        }
        count
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    handle: Handle,
    state: watch::Sender<ConnectionState>,
    /// Present until the read loop is spawned (or the connection closes unstarted).
    reader: Mutex<Option<FramedRead<BoxedReader, FrameCodec>>>,
    writer: tokio::sync::Mutex<FramedWrite<BoxedWriter, FrameCodec>>,
    pending: Mutex<PendingTable>,
    next_rpc_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Validated state transition; returns the previous state.
    fn transition(&self, next: ConnectionState) -> Result<ConnectionState> {
        let mut outcome = Err(ConnectionError::InvalidTransition {
            from: next,
            to: next,
        });

        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                outcome = Ok(*current);
                *current = next;
                true
            } else {
                outcome = Err(ConnectionError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });

        outcome
    }

    fn ensure_active(&self) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            Ok(())
        } else {
            Err(ConnectionError::NotActive(state))
        }
    }

    fn close_reason(&self) -> String {
        lock(&self.pending)
            .closed
            .clone()
            .unwrap_or_else(|| CLOSED_LOCALLY.to_string())
    }

    /// Moves to `Closing`, stops the read loop and rejects every pending call.
    /// Returns false if the connection was already closing or closed.
    fn begin_close(self: &Arc<Self>, reason: &str) -> bool {
        if self.transition(ConnectionState::Closing).is_err() {
            return false;
        }

        self.shutdown.cancel();

        let swept = lock(&self.pending).sweep(reason);
        if swept > 0 {
            debug!(swept, reason, "Rejected pending calls");
        }

        // Never started: no read loop exists to finish the teardown.
        if lock(&self.reader).take().is_some() {
            let inner = Arc::clone(self);
            self.handle.spawn(async move { inner.finish().await });
        }

        true
    }

    fn close_with_error(self: &Arc<Self>, reason: String) {
        if self.begin_close(&reason) {
            warn!("Closing with error {}", reason);
        }
    }

    async fn finish(&self) {
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.close().await {
                debug!(error = %e, "Failed to shut down write half");
            }
        }

        match self.transition(ConnectionState::Closed) {
            Ok(_) => info!("Connection closed"),
            Err(e) => debug!(error = %e, "Connection already settled"),
        }
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ConnectionError::Closed(self.close_reason())),
            result = async { self.writer.lock().await.send(frame).await } => result.map_err(ConnectionError::from),
        }
    }

    /// Handles one inbound frame. An `Err` carries the reason to close with.
    async fn dispatch(&self, frame: Frame) -> std::result::Result<(), String> {
        let op = CommandOp::try_from(frame.op).map_err(|op| format!("unknown command op {op}"))?;

        if !frame.is_rpc() {
            return match op {
                CommandOp::Ping => {
                    trace!("Answering ping");
                    self.write_frame(Frame::new(CommandOp::Pong.as_u8(), 0, Bytes::new()))
                        .await
                        .map_err(|e| e.to_string())
                }
                CommandOp::Pong => Ok(()),
                other => Err(format!("unexpected non-rpc op {other}")),
            };
        }

        // The client serves no RPCs of its own.
        if op.response_op().is_some() {
            return Err(format!("no handler for rpc request op {op}"));
        }

        let rpc_id = frame.rpc_id;
        let routed = lock(&self.pending).resolve(frame);
        match routed {
            Routed::Delivered => {
                trace!(rpc_id, %op, "Routed rpc reply");
                Ok(())
            }
            Routed::Abandoned => {
                debug!(rpc_id, "Discarded reply for abandoned call");
                Ok(())
            }
            Routed::Unknown => Err(format!("unexpected rpc response {rpc_id}")),
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut reader: FramedRead<BoxedReader, FrameCodec>) {
    debug!("Read loop started");

    loop {
        let next = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            next = reader.next() => next,
        };

        let outcome = match next {
            Some(Ok(frame)) => inner.dispatch(frame).await,
            Some(Err(e)) => Err(e.to_string()),
            None => Err(CLOSED_BY_PEER.to_string()),
        };

        if let Err(reason) = outcome {
            inner.close_with_error(reason);
            break;
        }
    }

    drop(reader);
    inner.finish().await;
    debug!("Read loop stopped");
}

/// Removes the pending record if the caller stops waiting early.
struct PendingGuard<'a> {
    inner: &'a Inner,
    rpc_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.inner.pending).abandon(self.rpc_id);
    }
}

/// Framed, correlating connection to the local server.
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wraps `stream`. The read loop is spawned on `handle` by [`Connection::start`].
    pub fn new<S>(stream: S, handle: Handle) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader: BoxedReader = Box::pin(read_half);
        let writer: BoxedWriter = Box::pin(write_half);
        let (state, _) = watch::channel(ConnectionState::Inactive);

        Self {
            inner: Arc::new(Inner {
                handle,
                state,
                reader: Mutex::new(Some(FramedRead::new(reader, FrameCodec::new()))),
                writer: tokio::sync::Mutex::new(FramedWrite::new(writer, FrameCodec::new())),
                pending: Mutex::new(PendingTable::default()),
                next_rpc_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Fails with [`ConnectionError::NotActive`] unless the connection is active.
    pub fn ensure_active(&self) -> Result<()> {
        self.inner.ensure_active()
    }

    /// Activates the connection and spawns its read loop.
    pub fn start(&self) -> Result<()> {
        let reader = {
            let mut slot = lock(&self.inner.reader);
            self.inner
                .transition(ConnectionState::Active)
                .map_err(|e| match e {
                    ConnectionError::InvalidTransition {
                        from: ConnectionState::Active,
                        ..
                    } => ConnectionError::AlreadyStarted,
                    other => other,
                })?;
            slot.take()
        };

        let Some(reader) = reader else {
            return Err(ConnectionError::AlreadyStarted);
        };

        info!("Connection active");
        self.inner
            .handle
            .spawn(read_loop(Arc::clone(&self.inner), reader));
        Ok(())
    }

    /// Sends `payload` under `op` and waits for the reply carrying the same rpc id.
    ///
    /// Resolves with the reply op, payload and rpc id, or with
    /// [`ConnectionError::Closed`] if the connection closes first.
    pub async fn write_rpc_request(
        &self,
        op: CommandOp,
        payload: Bytes,
    ) -> Result<(CommandOp, Bytes, u64)> {
        let expected = op.response_op().ok_or(ConnectionError::NotRpcOp(op))?;
        self.inner.ensure_active()?;

        let rpc_id = self.inner.next_rpc_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(rpc_id, tx)?;
        let _guard = PendingGuard {
            inner: &self.inner,
            rpc_id,
        };

        debug!(rpc_id, %op, bytes = payload.len(), "Sending rpc request");
        match self
            .inner
            .write_frame(Frame::new(op.as_u8(), rpc_id, payload))
            .await
        {
            Ok(()) => {}
            // Rejected by the encoder before anything hit the wire.
            Err(ConnectionError::Frame(FrameError::TooLarge(len))) => {
                lock(&self.inner.pending).forget(rpc_id);
                return Err(ConnectionError::Frame(FrameError::TooLarge(len)));
            }
            // Already swept; the reply channel carries the reason.
            Err(ConnectionError::Closed(_)) => {}
            Err(e) => self.inner.close_with_error(e.to_string()),
        }

        let reply = match rx.await {
            Ok(reply) => reply?,
            Err(_) => return Err(ConnectionError::Closed(self.inner.close_reason())),
        };

        let actual = CommandOp::try_from(reply.op).map_err(ConnectionError::UnknownOp)?;
        if actual != expected {
            return Err(ConnectionError::UnexpectedOp { expected, actual });
        }

        debug!(rpc_id, bytes = reply.payload.len(), "Received rpc reply");
        Ok((actual, reply.payload, rpc_id))
    }

    /// Requests an orderly close. Pending calls fail with `"connection closed"`.
    pub fn close(&self) {
        if self.inner.begin_close(CLOSED_LOCALLY) {
            info!("Closing connection");
        }
    }

    /// Closes the connection, failing every pending call with `reason`.
    pub fn close_with_error(&self, reason: impl Into<String>) {
        self.inner.close_with_error(reason.into());
    }

    /// Waits until the connection has fully settled in [`ConnectionState::Closed`].
    pub async fn wait_until_closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| state.is_closed()).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.begin_close(CLOSED_LOCALLY);
    }
}
