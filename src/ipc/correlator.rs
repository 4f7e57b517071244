//! Id-to-waiter table for in-flight calls.
//!
//! Owned by the connection task alone, so it needs no lock. A call is
//! registered before its request is written, which means a fast response can
//! never arrive ahead of its waiter.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::protocol::{JsonRpcResponse, RequestId};

/// Single-use sender that completes one call.
pub type Reply = oneshot::Sender<Result<Value, ClientError>>;

/// A call waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    method: String,
    created_at: Instant,
    reply: Reply,
}

impl PendingCall {
    pub fn new(method: impl Into<String>, reply: Reply) -> Self {
        Self {
            method: method.into(),
            created_at: Instant::now(),
            reply,
        }
    }
}

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Resolved,
    Rejected,
    /// No pending call had this id (late, duplicate, or a notification).
    Unmatched,
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<RequestId, PendingCall>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter under `id`.
    ///
    /// An id already in the table is refused, and the new waiter is failed
    /// with a protocol error; the existing waiter is left untouched.
    pub fn register(&mut self, id: RequestId, call: PendingCall) -> bool {
        if self.pending.contains_key(&id) {
            let _ = call.reply.send(Err(ClientError::Protocol(format!(
                "request id {} is already in flight",
                id
            ))));
            return false;
        }
        self.pending.insert(id, call);
        true
    }

    /// Complete the waiter matching `response.id`, exactly once.
    pub fn dispatch(&mut self, response: JsonRpcResponse) -> Dispatch {
        let Some(id) = response.id.clone() else {
            debug!("Dropping response without id");
            return Dispatch::Unmatched;
        };

        let Some(call) = self.pending.remove(&id) else {
            debug!("#{} <-- no pending call, dropped", id);
            return Dispatch::Unmatched;
        };

        let elapsed = call.created_at.elapsed();
        let (outcome, dispatch) = match response.into_outcome() {
            Ok(result) => {
                debug!("#{} <-- {} ok in {:?}", id, call.method, elapsed);
                trace!("#{} <-- {}", id, result);
                (Ok(result), Dispatch::Resolved)
            }
            Err(err) => {
                debug!("#{} <-- {} failed in {:?}: {}", id, call.method, elapsed, err);
                (Err(err), Dispatch::Rejected)
            }
        };

        if call.reply.send(outcome).is_err() {
            trace!("#{} caller no longer waiting", id);
        }
        dispatch
    }

    /// Remove a waiter without completing it. Used when the caller's
    /// timeout fired.
    pub fn forget(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Fail the waiter under `id` without a response from the daemon.
    pub fn reject(&mut self, id: &RequestId, err: ClientError) -> bool {
        match self.pending.remove(id) {
            Some(call) => {
                let _ = call.reply.send(Err(err));
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
