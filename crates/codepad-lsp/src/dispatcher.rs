//! Request/response correlation for one session.
//!
//! Tracks pending requests by ID and routes responses to waiting callers
//! via oneshot channels. Everything else that arrives is classified and
//! handed back to the caller, so that fan-out and replies happen outside
//! whatever lock guards the dispatcher.
use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::notification::ServerNotification;
use crate::transport::{JsonRpcMessage, RequestId, RpcError};

/// The result dispatched to a waiting request.
#[derive(Debug)]
pub enum DispatchResult {
    /// Successful response with the result value.
    Success(Value),
    /// Error response from the server.
    Error(RpcError),
}

/// What [`Dispatcher::dispatch`] did with an incoming message.
#[derive(Debug)]
pub enum Dispatched {
    /// A response resolved the pending request for `method`.
    Resolved { id: RequestId, method: String },
    /// A response matched no pending request and was dropped.
    Dropped(RequestId),
    /// A notification, to be fanned out.
    Notification(ServerNotification),
    /// A server-initiated request that expects an answer.
    ServerRequest {
        id: RequestId,
        method: String,
        params: Value,
    },
}

struct PendingRequest {
    method: String,
    sender: oneshot::Sender<DispatchResult>,
}

/// Manages pending requests and routes responses.
pub struct Dispatcher {
    next_id: i64,
    pending: HashMap<RequestId, PendingRequest>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate a fresh request ID. IDs still awaiting a response are never
    /// handed out again.
    pub fn next_id(&mut self) -> RequestId {
        loop {
            let id = RequestId::Number(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register a pending request and return a receiver for the response.
    pub fn register_request(
        &mut self,
        id: RequestId,
        method: &str,
    ) -> oneshot::Receiver<DispatchResult> {
        let (sender, rx) = oneshot::channel();
        let previous = self.pending.insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                sender,
            },
        );
        if previous.is_some() {
            tracing::warn!(%id, method, "request id reused while outstanding");
        }
        rx
    }

    /// How many requests are pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The method of a pending request.
    pub fn pending_method(&self, id: &RequestId) -> Option<&str> {
        self.pending.get(id).map(|p| p.method.as_str())
    }

    /// Route an incoming message.
    ///
    /// - Responses resolve the pending request with the same ID and are not
    ///   reported further; unknown IDs are dropped.
    /// - Notifications are decoded and returned for fan-out.
    /// - Server requests are returned so the caller can answer them.
    pub fn dispatch(&mut self, message: JsonRpcMessage) -> Dispatched {
        match message {
            JsonRpcMessage::Response { id, result, error } => match self.pending.remove(&id) {
                Some(PendingRequest { method, sender }) => {
                    let dispatch_result = match error {
                        Some(err) => DispatchResult::Error(err),
                        None => DispatchResult::Success(result.unwrap_or(Value::Null)),
                    };
                    // The caller may have given up already.
                    let _ = sender.send(dispatch_result);
                    Dispatched::Resolved { id, method }
                }
                None => {
                    tracing::debug!(%id, "dropping response for unknown request id");
                    Dispatched::Dropped(id)
                }
            },
            JsonRpcMessage::Notification { method, params } => {
                Dispatched::Notification(ServerNotification::parse(method, params))
            }
            JsonRpcMessage::Request { id, method, params } => {
                Dispatched::ServerRequest { id, method, params }
            }
        }
    }

    /// Forget a pending request. Returns true if it was found.
    ///
    /// The waiting receiver observes a closed channel.
    pub fn cancel(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Forget every pending request, failing all waiters. Returns how many
    /// there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}
