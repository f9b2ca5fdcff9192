//! Callback registry
//!
//! Connection-scoped table of in-flight requests keyed by callback index.
//! Replies can arrive in any order, so every lookup is by index rather than
//! by position. One mutex serializes `register`, `resolve`, `abandon` and
//! `fail_all`; an entry is removed under that lock before its completion is
//! fired, which is what makes every completion fire at most once.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::protocol::{CallbackIndex, Response, ResponseBody, Value};
use crate::error::{DriverError, DriverResult};

/// What a pending caller eventually receives
pub type Completion = DriverResult<Value>;

struct PendingRequest {
    completion: oneshot::Sender<Completion>,
    created_at: Instant,
}

struct RegistryState {
    next_index: CallbackIndex,
    pending: HashMap<CallbackIndex, PendingRequest>,
    /// Indices whose caller gave up (timeout) but whose reply may still come.
    /// They stay reserved until that reply shows up or the connection fails.
    abandoned: HashSet<CallbackIndex>,
    closed: Option<String>,
}

impl RegistryState {
    fn allocate(&mut self) -> CallbackIndex {
        loop {
            let index = self.next_index;
            self.next_index = self.next_index.wrapping_add(1);
            if !self.pending.contains_key(&index) && !self.abandoned.contains(&index) {
                return index;
            }
        }
    }
}

pub struct CallbackRegistry {
    state: Mutex<RegistryState>,
    max_pending: usize,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::with_max_pending(usize::MAX)
    }

    /// Registry refusing new requests once `max_pending` are outstanding.
    /// Abandoned-but-reserved indices count against the limit.
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_index: 0,
                pending: HashMap::new(),
                abandoned: HashSet::new(),
                closed: None,
            }),
            max_pending: max_pending.clamp(1, u32::MAX as usize),
        }
    }

    /// Reserve a fresh callback index and the handle its reply will complete.
    pub fn register(&self) -> DriverResult<Registration> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(DriverError::ConnectionClosed(reason.clone()));
        }
        if state.pending.len() + state.abandoned.len() >= self.max_pending {
            return Err(DriverError::TooManyPending(self.max_pending));
        }

        let index = state.allocate();
        let (completion, receiver) = oneshot::channel();
        state.pending.insert(
            index,
            PendingRequest {
                completion,
                created_at: Instant::now(),
            },
        );
        Ok(Registration { index, receiver })
    }

    /// Hand a decoded response to the caller waiting on its index.
    ///
    /// A response for an index nobody is waiting on means the stream is out
    /// of sync and is reported as `FatalProtocol`. Late replies for abandoned
    /// indices are dropped.
    pub fn resolve(&self, response: Response) -> DriverResult<()> {
        let index = response.callback_idx;
        let entry = {
            let mut state = self.state.lock();
            let removed = state.pending.remove(&index);
            match removed {
                Some(entry) => entry,
                None if state.abandoned.remove(&index) => {
                    tracing::debug!(callback_idx = index, "Dropping late reply for abandoned request");
                    return Ok(());
                }
                None => {
                    return Err(DriverError::FatalProtocol(format!(
                        "No pending request for callback index {}",
                        index
                    )));
                }
            }
        };

        let outcome = match response.body {
            ResponseBody::Value(value) => Ok(value),
            ResponseBody::Error(err) => Err(DriverError::Server(err)),
            ResponseBody::ClosingError(msg) => Err(DriverError::ConnectionClosed(msg)),
        };

        tracing::trace!(
            callback_idx = index,
            elapsed_us = entry.created_at.elapsed().as_micros() as u64,
            "Resolved request"
        );

        // The receiver is gone if the caller stopped waiting; the entry is
        // already out of the table either way.
        let _ = entry.completion.send(outcome);
        Ok(())
    }

    /// Complete every pending request with `error` and close the registry.
    ///
    /// Returns the number of requests that were failed. Calling it again on a
    /// closed registry fails nothing and keeps the first close reason.
    pub fn fail_all(&self, error: DriverError) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(match &error {
                    DriverError::ConnectionClosed(reason) => reason.clone(),
                    other => other.to_string(),
                });
            }
            state.abandoned.clear();
            state.pending.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.completion.send(Err(error.clone()));
        }
        count
    }

    /// Give up on a request whose reply may still arrive.
    ///
    /// Returns false when the request was no longer pending (already
    /// resolved or failed).
    pub fn abandon(&self, index: CallbackIndex) -> bool {
        let mut state = self.state.lock();
        if state.pending.remove(&index).is_none() {
            return false;
        }
        if state.closed.is_none() {
            state.abandoned.insert(index);
        }
        true
    }

    /// Drop a registration that never reached the wire.
    pub fn discard(&self, index: CallbackIndex) -> bool {
        self.state.lock().pending.remove(&index).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn abandoned_count(&self) -> usize {
        self.state.lock().abandoned.len()
    }

    /// Age of the longest-waiting request
    pub fn oldest_pending(&self) -> Option<Duration> {
        self.state
            .lock()
            .pending
            .values()
            .map(|entry| entry.created_at.elapsed())
            .max()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.state.lock().closed.clone()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one registered request; resolves with its reply.
#[derive(Debug)]
pub struct Registration {
    index: CallbackIndex,
    receiver: oneshot::Receiver<Completion>,
}

impl Registration {
    pub fn index(&self) -> CallbackIndex {
        self.index
    }

    /// Take the completion if it has already been delivered.
    pub fn try_take(&mut self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }
}

impl Future for Registration {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let index = self.index;
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(DriverError::ConnectionClosed(format!(
                    "request {} was dropped before completion",
                    index
                )))
            })
        })
    }
}
