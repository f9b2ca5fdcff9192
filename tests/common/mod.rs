//! Common test utilities for driver tests
//!
//! Provides:
//! - A raw peer that speaks the frame format by hand, so tests can choose
//!   exactly when and in which order replies go out
//! - A small in-memory engine that understands GET/SET/DEL/INCR/WATCH and
//!   batched transactions, served over an in-process pipe or TCP

#![allow(dead_code)]

use kvmux::driver::protocol::{
    decode_request, encode_response, Command, Request, RequestBody, RequestType, Response,
    ResponseBody, ResponseError, Value,
};
use kvmux::{DriverError, Session, SessionConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Session wired to a raw peer through an in-process pipe.
pub fn session_pair(config: SessionConfig) -> (Session, RawPeer) {
    session_pair_with_capacity(config, PIPE_CAPACITY)
}

/// Like [`session_pair`], but writes block once `capacity` bytes are unread.
pub fn session_pair_with_capacity(config: SessionConfig, capacity: usize) -> (Session, RawPeer) {
    let (client, server) = tokio::io::duplex(capacity);
    let (read, write) = tokio::io::split(client);
    (Session::new(read, write, config), RawPeer::new(server))
}

/// The engine side of a connection, driven by the test.
pub struct RawPeer<S = DuplexStream> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RawPeer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Next request from the session, or `None` once it hung up.
    pub async fn read_request(&mut self) -> Option<Request> {
        let mut chunk = [0u8; 4096];
        loop {
            let mut cursor: &[u8] = &self.buf;
            match decode_request(&mut cursor) {
                Ok(request) => {
                    let consumed = self.buf.len() - cursor.len();
                    self.buf.drain(..consumed);
                    return Some(request);
                }
                Err(DriverError::Incomplete { .. }) => {}
                Err(e) => panic!("session sent a malformed frame: {}", e),
            }

            let n = self.stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn read_requests(&mut self, count: usize) -> Vec<Request> {
        let mut requests = Vec::with_capacity(count);
        for _ in 0..count {
            requests.push(self.read_request().await.expect("session hung up"));
        }
        requests
    }

    pub async fn write_response(&mut self, response: &Response) -> std::io::Result<()> {
        let frame = encode_response(response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.write_raw(&frame).await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }
}

/// First argument of a single-command request, as text.
pub fn first_arg(request: &Request) -> String {
    match &request.body {
        RequestBody::Single(command) => {
            String::from_utf8_lossy(command.arg(0).unwrap_or_default()).into_owned()
        }
        RequestBody::Batch(_) => panic!("expected a single command, got a batch"),
    }
}

// ============================================================================
// In-memory engine
// ============================================================================

#[derive(Default)]
struct EngineState {
    store: HashMap<Vec<u8>, Vec<u8>>,
    /// Bumped on every write; WATCH snapshots it
    versions: HashMap<Vec<u8>, u64>,
}

impl EngineState {
    fn version(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &[u8]) {
        *self.versions.entry(key.to_vec()).or_insert(0) += 1;
    }
}

/// Keys watched by one connection, with the version seen at WATCH time
type Watched = HashMap<Vec<u8>, u64>;

#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session connected to this engine through an in-process pipe.
    pub fn session(&self, config: SessionConfig) -> Session {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(self.clone().serve(server));
        let (read, write) = tokio::io::split(client);
        Session::new(read, write, config)
    }

    /// Accept TCP connections on an ephemeral local port.
    pub async fn serve_tcp(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("listener has no address");
        let engine = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(engine.clone().serve(stream));
            }
        });
        addr
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().store.get(key.as_bytes()).cloned()
    }

    async fn serve<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut peer = RawPeer::new(stream);
        let mut watched = Watched::new();

        while let Some(request) = peer.read_request().await {
            let body = match &request.body {
                RequestBody::Single(command) => {
                    let mut state = self.state.lock();
                    match apply(&mut state, command, &mut watched) {
                        Value::Error(err) => ResponseBody::Error(err),
                        value => ResponseBody::Value(value),
                    }
                }
                RequestBody::Batch(batch) => {
                    let mut state = self.state.lock();
                    if batch.is_atomic {
                        let conflict = watched
                            .iter()
                            .any(|(key, seen)| state.version(key) != *seen);
                        watched.clear();
                        if conflict {
                            ResponseBody::Value(Value::Nil)
                        } else {
                            ResponseBody::Value(run_all(&mut state, &batch.commands, &mut watched))
                        }
                    } else {
                        ResponseBody::Value(run_all(&mut state, &batch.commands, &mut watched))
                    }
                }
            };

            let response = Response {
                callback_idx: request.callback_idx,
                body,
            };
            if peer.write_response(&response).await.is_err() {
                break;
            }
        }
    }
}

fn run_all(state: &mut EngineState, commands: &[Command], watched: &mut Watched) -> Value {
    Value::Array(
        commands
            .iter()
            .map(|command| apply(state, command, watched))
            .collect(),
    )
}

fn apply(state: &mut EngineState, command: &Command, watched: &mut Watched) -> Value {
    let args: Vec<&[u8]> = command.args().iter().map(|a| a.as_slice()).collect();
    match command.request_type() {
        RequestType::Ping => Value::Status("PONG".to_string()),
        RequestType::Hello | RequestType::ClientSetName => Value::Okay,
        RequestType::Echo => Value::bulk(args[0]),
        RequestType::Get => match state.store.get(args[0]) {
            Some(value) => Value::bulk(value),
            None => Value::Nil,
        },
        RequestType::Set => {
            state.store.insert(args[0].to_vec(), args[1].to_vec());
            state.touch(args[0]);
            Value::Okay
        }
        RequestType::Del => {
            let mut removed = 0;
            for key in &args {
                if state.store.remove(*key).is_some() {
                    state.touch(key);
                    removed += 1;
                }
            }
            Value::Int(removed)
        }
        RequestType::Exists => {
            Value::Int(args.iter().filter(|k| state.store.contains_key(**k)).count() as i64)
        }
        RequestType::Incr | RequestType::IncrBy => {
            let delta = match args.get(1) {
                Some(raw) => match parse_int(raw) {
                    Some(n) => n,
                    None => return not_an_integer(),
                },
                None => 1,
            };
            let current = match state.store.get(args[0]) {
                Some(raw) => match parse_int(raw) {
                    Some(n) => n,
                    None => return not_an_integer(),
                },
                None => 0,
            };
            let next = current + delta;
            state.store.insert(args[0].to_vec(), next.to_string().into_bytes());
            state.touch(args[0]);
            Value::Int(next)
        }
        RequestType::Watch => {
            for key in &args {
                watched.insert(key.to_vec(), state.version(key));
            }
            Value::Okay
        }
        RequestType::Unwatch => {
            watched.clear();
            Value::Okay
        }
        _ => Value::Error(ResponseError::unspecified(format!(
            "ERR unknown command '{}'",
            command.name()
        ))),
    }
}

fn parse_int(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn not_an_integer() -> Value {
    Value::Error(ResponseError::unspecified(
        "ERR value is not an integer or out of range",
    ))
}
