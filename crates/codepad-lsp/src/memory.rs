//! In-process transport.
//!
//! The host side (a WASM-hosted server, or a test) pulls what the client
//! sent with [`MemoryTransport::next_sent`] and pushes server envelopes in
//! with [`MemoryTransport::deliver`]. Delivery runs the client's listener
//! synchronously on the caller's task.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::LspError;
use crate::transport::{CloseListener, JsonRpcMessage, MessageListener, Transport};

pub struct MemoryTransport {
    sent_tx: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    listener: Mutex<Option<MessageListener>>,
    on_close: Mutex<Option<CloseListener>>,
    files: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sent_tx: Mutex::new(Some(tx)),
            sent_rx: tokio::sync::Mutex::new(rx),
            listener: Mutex::new(None),
            on_close: Mutex::new(None),
            files: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Wait for the next envelope the client sent. `None` once the
    /// transport is closed and drained.
    pub async fn next_sent(&self) -> Option<JsonRpcMessage> {
        self.sent_rx.lock().await.recv().await
    }

    /// The next sent envelope if one is already queued.
    pub fn try_next_sent(&self) -> Option<JsonRpcMessage> {
        self.sent_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Drain every envelope queued so far.
    pub fn drain_sent(&self) -> Vec<JsonRpcMessage> {
        std::iter::from_fn(|| self.try_next_sent()).collect()
    }

    /// Hand a server envelope to the client. Returns `false` when the
    /// transport is closed or nobody is listening.
    pub fn deliver(&self, message: JsonRpcMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        let listener = self.listener.lock().ok().and_then(|l| l.clone());
        match listener {
            Some(listener) => {
                listener(message);
                true
            }
            None => {
                tracing::debug!("memory transport has no listener, dropping message");
                false
            }
        }
    }

    /// The host went away: stop traffic and tell the client.
    pub fn disconnect(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut tx) = self.sent_tx.lock() {
            tx.take();
        }
        let on_close = self.on_close.lock().ok().and_then(|mut l| l.take());
        if let Some(on_close) = on_close {
            on_close(reason.to_string());
        }
    }

    /// Contents previously pushed with [`Transport::write_file`].
    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: &JsonRpcMessage) -> Result<(), LspError> {
        let guard = self
            .sent_tx
            .lock()
            .map_err(|_| LspError::Transport("sender lock poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| LspError::Transport("transport closed".into()))?;
        tx.send(message.clone())
            .map_err(|_| LspError::Transport("host dropped the receiver".into()))
    }

    fn set_listener(&self, listener: MessageListener) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(listener);
        }
    }

    fn set_close_listener(&self, listener: CloseListener) {
        if let Ok(mut slot) = self.on_close.lock() {
            *slot = Some(listener);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut tx) = self.sent_tx.lock() {
            tx.take();
        }
    }

    fn write_file(&self, path: &str, contents: &str) -> Result<(), LspError> {
        if self.is_closed() {
            return Err(LspError::Transport("transport closed".into()));
        }
        self.files
            .lock()
            .map_err(|_| LspError::Transport("file map lock poisoned".into()))?
            .insert(path.to_string(), contents.to_string());
        Ok(())
    }
}
