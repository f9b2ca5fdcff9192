//! Multiplexed session
//!
//! A [`Session`] owns one connection. Any number of tasks may issue requests
//! through clones of the same session: each request gets a callback index
//! from the registry, is written as one frame, and the caller then waits on
//! its own completion. A background task reads reply frames and routes each
//! one to the registry by index, whatever order they arrive in.
//!
//! Frames are written by a dedicated writer task fed through a channel.
//! Enqueueing never awaits, so a caller that stops waiting can neither leave
//! its index registered but unsent nor leave half a frame on the wire.

mod builder;
mod commands;
mod transaction;

pub use builder::SessionBuilder;

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{
    decode_response, encode_request, Command, Request, RequestBody, RequestType, Response,
    ResponseBody, Value,
};
use super::registry::CallbackRegistry;
use crate::config::SessionConfig;
use crate::error::{DriverError, DriverResult};

const READ_CHUNK_SIZE: usize = 8 * 1024;
/// How long `close` waits for queued frames to reach a slow peer
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    registry: Arc<CallbackRegistry>,
    /// Frames for the writer task; `None` once the session is closed
    outbound: parking_lot::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    writer_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    config: SessionConfig,
}

impl Session {
    /// Start a session over an already-connected byte stream.
    ///
    /// Spawns the reader and writer tasks, so it must be called from within
    /// a Tokio runtime. No handshake is sent; see [`Session::hello`].
    pub fn new<R, W>(reader: R, writer: W, config: SessionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let registry = Arc::new(CallbackRegistry::with_max_pending(config.max_pending));
        let (outbound, frames) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, registry.clone()));
        let writer_task = tokio::spawn(write_loop(writer, frames, registry.clone()));

        Self {
            inner: Arc::new(SessionInner {
                registry,
                outbound: parking_lot::Mutex::new(Some(outbound)),
                reader_task: parking_lot::Mutex::new(Some(reader_task)),
                writer_task: parking_lot::Mutex::new(Some(writer_task)),
                config,
            }),
        }
    }

    /// Send a command by name and wait for its reply.
    pub async fn call<I, A>(&self, name: &str, args: I) -> DriverResult<Value>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let command = Command::from_name(name, args)?;
        self.call_command(command).await
    }

    pub async fn call_command(&self, command: Command) -> DriverResult<Value> {
        self.dispatch(RequestBody::Single(command)).await
    }

    /// Announce the protocol version and client name to the engine.
    pub async fn hello(&self) -> DriverResult<Value> {
        let config = &self.inner.config;
        let mut args: Vec<Vec<u8>> = vec![config.protocol.as_arg().as_bytes().to_vec()];
        if let Some(name) = &config.client_name {
            args.push(b"SETNAME".to_vec());
            args.push(name.as_bytes().to_vec());
        }
        let command = Command::new(RequestType::Hello, args)?;
        self.call_command(command).await
    }

    /// Fail every pending request and release the connection.
    ///
    /// Frames already queued are still written before the write half is
    /// shut down, unless the peer has stopped reading.
    pub async fn close(&self) {
        let failed = self
            .inner
            .registry
            .fail_all(DriverError::ConnectionClosed("session closed".to_string()));
        let reader_task = self.inner.reader_task.lock().take();
        if let Some(task) = reader_task {
            task.abort();
        }
        // Dropping the sender lets the writer drain and shut down
        drop(self.inner.outbound.lock().take());
        let writer_task = self.inner.writer_task.lock().take();
        if let Some(mut task) = writer_task {
            if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::debug!("Writer still blocked after {:?}; aborting", CLOSE_DRAIN_TIMEOUT);
                task.abort();
            }
        }
        tracing::info!(failed, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    /// Number of requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.inner.registry.oldest_pending()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Register, enqueue and wait.
    ///
    /// Nothing between `register` and the enqueue awaits, so dropping the
    /// returned future at any point leaves either nothing registered or a
    /// whole frame on its way whose reply will clear the entry. The timeout
    /// covers the write as well as the reply.
    async fn dispatch(&self, body: RequestBody) -> DriverResult<Value> {
        let registry = &self.inner.registry;
        let mut registration = registry.register()?;
        let index = registration.index();

        let frame = match encode_request(&Request {
            callback_idx: index,
            body,
        }) {
            Ok(frame) => frame,
            Err(e) => {
                registry.discard(index);
                return Err(e);
            }
        };

        let bytes = frame.len();
        if let Err(e) = self.inner.enqueue(frame) {
            registry.discard(index);
            return Err(e);
        }
        tracing::debug!(callback_idx = index, bytes, "Request queued");

        let Some(limit) = self.inner.config.request_timeout else {
            return registration.await;
        };

        match tokio::time::timeout(limit, &mut registration).await {
            Ok(completion) => completion,
            Err(_) if registry.abandon(index) => {
                tracing::debug!(callback_idx = index, ?limit, "Request timed out");
                Err(DriverError::Timeout(limit))
            }
            // Resolved or failed while the timer fired; the completion is on its way
            Err(_) => registration.await,
        }
    }
}

impl SessionInner {
    fn enqueue(&self, frame: Vec<u8>) -> DriverResult<()> {
        let outbound = self.outbound.lock();
        let sent = match outbound.as_ref() {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }
        Err(DriverError::ConnectionClosed(
            self.registry
                .close_reason()
                .unwrap_or_else(|| "session closed".to_string()),
        ))
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.get_mut().take() {
            task.abort();
        }
        // The writer task ends once the channel is closed
        self.outbound.get_mut().take();
        self.registry
            .fail_all(DriverError::ConnectionClosed("session dropped".to_string()));
    }
}

/// Write queued frames until the channel closes or a write fails.
///
/// Frames that are already queued are written back to back before a single
/// flush. A failed write fails every pending request; nothing more is sent.
async fn write_loop<W>(
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    registry: Arc<CallbackRegistry>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut written = writer.write_all(&frame).await;
        while written.is_ok() {
            match frames.try_recv() {
                Ok(next) => written = writer.write_all(&next).await,
                Err(_) => break,
            }
        }
        if written.is_ok() {
            written = writer.flush().await;
        }

        if let Err(e) = written {
            let err = DriverError::Transport(format!("Write failed: {}", e));
            let failed = registry.fail_all(err.clone());
            tracing::warn!(failed, "Writer stopped: {}", err);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Shutdown of write half failed: {}", e);
    }
}

async fn read_loop<R>(mut reader: R, registry: Arc<CallbackRegistry>)
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    let reason = loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break DriverError::ConnectionClosed("connection closed by peer".to_string()),
            Ok(n) => n,
            Err(e) => break DriverError::Transport(format!("Read failed: {}", e)),
        };
        buf.extend_from_slice(&chunk[..n]);

        if let Err(e) = drain_frames(&mut buf, &registry) {
            break e;
        }
    };

    let failed = registry.fail_all(reason.clone());
    match &reason {
        DriverError::ConnectionClosed(_) => {
            tracing::debug!(failed, "Reader stopped: {}", reason)
        }
        _ => tracing::warn!(failed, "Reader stopped: {}", reason),
    }
}

/// Route every complete frame in `buf` and drop the consumed bytes.
/// A trailing partial frame stays buffered for the next read.
fn drain_frames(buf: &mut Vec<u8>, registry: &CallbackRegistry) -> DriverResult<()> {
    let mut cursor: &[u8] = buf.as_slice();
    let result = loop {
        match decode_response(&mut cursor) {
            Ok(response) => {
                if let Err(e) = route(response, registry) {
                    break Err(e);
                }
            }
            Err(DriverError::Incomplete { .. }) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let consumed = buf.len() - cursor.len();
    buf.drain(..consumed);
    result
}

fn route(response: Response, registry: &CallbackRegistry) -> DriverResult<()> {
    if let ResponseBody::ClosingError(msg) = &response.body {
        tracing::warn!(
            callback_idx = response.callback_idx,
            "Engine is closing the connection: {}",
            msg
        );
        return Err(DriverError::ConnectionClosed(msg.clone()));
    }
    registry.resolve(response)
}
