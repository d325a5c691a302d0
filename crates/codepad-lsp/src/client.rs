//! Protocol session with a single language server.
//!
//! Owns the `initialize` handshake, correlates requests with responses,
//! exposes typed wrappers for the methods the editor uses and fans server
//! notifications out to attached document plugins.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::dispatcher::{DispatchResult, Dispatched, Dispatcher};
use crate::error::LspError;
use crate::notification::ServerNotification;
use crate::registry::{NotificationListener, PluginId, PluginRegistry};
use crate::transport::{JsonRpcMessage, Transport};
use crate::types::{
    client_capabilities, CompletionContext, CompletionItem, FormattingOptions, Hover,
    LspCapabilities, MessageParams, MessageType, Position, TextEdit, WorkspaceFolder,
};

/// Default timeout for requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `initialize` waits this many standard timeouts; servers can be slow to
/// cold-start.
const INITIALIZE_TIMEOUT_FACTOR: u32 = 3;

/// State of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Created, handshake not started yet.
    Uninitialized,
    /// `initialize` sent, waiting for the server.
    Initializing,
    /// Handshake complete; requests may be sent.
    Ready,
    /// Handshake failed with the given reason.
    InitFailed(String),
    /// `shutdown` sent.
    ShuttingDown,
    /// Transport closed. The session is unusable.
    Stopped,
}

/// Parameters for [`LanguageServerClient::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Root of the workspace, sent as `rootUri`.
    pub root_uri: Option<String>,
    pub workspace_folders: Vec<WorkspaceFolder>,
    /// The document the session was created for.
    pub document_uri: String,
    pub language_id: String,
    pub request_timeout: Duration,
    /// Close the session when its last plugin detaches.
    pub auto_close: bool,
}

impl ClientOptions {
    pub fn new(document_uri: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            root_uri: None,
            workspace_folders: Vec::new(),
            document_uri: document_uri.into(),
            language_id: language_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_close: false,
        }
    }

    /// Set the root and announce it as the single workspace folder.
    pub fn with_root(mut self, root_uri: impl Into<String>) -> Self {
        let root_uri = root_uri.into();
        let name = root_uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        self.workspace_folders = vec![WorkspaceFolder {
            uri: root_uri.clone(),
            name,
        }];
        self.root_uri = Some(root_uri);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }
}

/// A session with one language server over one transport.
///
/// Shared by `Arc` across every document that talks to the server.
pub struct LanguageServerClient {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    dispatcher: Mutex<Dispatcher>,
    state: watch::Sender<ClientState>,
    capabilities: OnceLock<LspCapabilities>,
    plugins: Mutex<PluginRegistry>,
    closed: AtomicBool,
    /// Why the server went away, when it did so on its own.
    disconnected: OnceLock<String>,
}

impl LanguageServerClient {
    /// Start a session: register on the transport and spawn the `initialize`
    /// handshake. Await [`wait_ready`](Self::wait_ready) before sending
    /// requests.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(options: ClientOptions, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (state, _) = watch::channel(ClientState::Uninitialized);
        let client = Arc::new(Self {
            options,
            transport,
            dispatcher: Mutex::new(Dispatcher::new()),
            state,
            capabilities: OnceLock::new(),
            plugins: Mutex::new(PluginRegistry::new()),
            closed: AtomicBool::new(false),
            disconnected: OnceLock::new(),
        });

        let weak: Weak<Self> = Arc::downgrade(&client);
        client
            .transport
            .set_listener(Arc::new(move |message: JsonRpcMessage| {
                if let Some(client) = weak.upgrade() {
                    client.handle_message(message);
                }
            }));
        let weak: Weak<Self> = Arc::downgrade(&client);
        client
            .transport
            .set_close_listener(Arc::new(move |reason: String| {
                if let Some(client) = weak.upgrade() {
                    client.transport_closed(reason);
                }
            }));

        let handshake = client.clone();
        tokio::spawn(async move { handshake.initialize().await });
        client
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// `true` once the handshake has completed and until shutdown.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), ClientState::Ready)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Capabilities negotiated in the handshake; `None` until ready.
    pub fn capabilities(&self) -> Option<&LspCapabilities> {
        self.capabilities.get()
    }

    /// Resolve once the handshake finished.
    pub async fn wait_ready(&self) -> Result<(), LspError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, ClientState::Uninitialized | ClientState::Initializing))
            .await
            .map_err(|_| self.closed_error())?;
        match &*state {
            ClientState::Ready => Ok(()),
            ClientState::InitFailed(reason) => Err(LspError::InitFailed(reason.clone())),
            _ => Err(self.closed_error()),
        }
    }

    /// [`LspError::closed`], or the disconnect reason if the server went
    /// away.
    fn closed_error(&self) -> LspError {
        match self.disconnected.get() {
            Some(reason) => LspError::Transport(reason.clone()),
            None => LspError::closed(),
        }
    }

    async fn initialize(&self) {
        if !self.transition(&ClientState::Uninitialized, ClientState::Initializing) {
            return;
        }
        let params = json!({
            "processId": null,
            "clientInfo": {
                "name": "codepad",
                "version": env!("CARGO_PKG_VERSION")
            },
            "rootUri": self.options.root_uri,
            "workspaceFolders": if self.options.workspace_folders.is_empty() {
                Value::Null
            } else {
                json!(self.options.workspace_folders)
            },
            "capabilities": client_capabilities()
        });
        let timeout = self.options.request_timeout * INITIALIZE_TIMEOUT_FACTOR;

        let outcome = match self.send_request("initialize", params, timeout).await {
            Ok(result) => {
                let caps = LspCapabilities::from_server_capabilities(
                    result.get("capabilities").unwrap_or(&Value::Null),
                );
                tracing::info!(
                    hover = caps.hover,
                    completion = caps.completion,
                    formatting = caps.formatting,
                    "language server initialized"
                );
                let _ = self.capabilities.set(caps);
                self.notify("initialized", json!({}))
                    .map(|()| ClientState::Ready)
                    .unwrap_or_else(|e| ClientState::InitFailed(e.to_string()))
            }
            Err(e) => ClientState::InitFailed(e.to_string()),
        };
        if let ClientState::InitFailed(reason) = &outcome {
            tracing::warn!("language server initialization failed: {reason}");
        }
        self.transition(&ClientState::Initializing, outcome);
    }

    /// Move to `to` only from `from`; a concurrent close wins.
    fn transition(&self, from: &ClientState, to: ClientState) -> bool {
        self.state.send_if_modified(|state| {
            if state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn dispatcher(&self) -> MutexGuard<'_, Dispatcher> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn plugins(&self) -> MutexGuard<'_, PluginRegistry> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a request once the session is ready and wait for its result
    /// with the standard timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, LspError> {
        self.wait_ready().await?;
        self.send_request(method, params, self.options.request_timeout)
            .await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, LspError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let (id, rx) = {
            let mut dispatcher = self.dispatcher();
            let id = dispatcher.next_id();
            let rx = dispatcher.register_request(id.clone(), method);
            (id, rx)
        };

        tracing::debug!(%id, method, "sending request");
        if let Err(e) = self
            .transport
            .send(&JsonRpcMessage::request(id.clone(), method, params))
        {
            self.dispatcher().cancel(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.dispatcher().cancel(&id);
                tracing::warn!(%id, method, "request timed out");
                Err(LspError::RequestTimeout {
                    method: method.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Ok(Err(_)) => Err(self.closed_error()),
            Ok(Ok(DispatchResult::Success(value))) => Ok(value),
            Ok(Ok(DispatchResult::Error(err))) => Err(LspError::Protocol {
                code: err.code,
                message: err.message,
            }),
        }
    }

    /// Send a notification. Never waits.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), LspError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        tracing::debug!(method, "sending notification");
        self.transport
            .send(&JsonRpcMessage::notification(method, params))
    }

    /// Everything the transport delivers comes through here.
    fn handle_message(&self, message: JsonRpcMessage) {
        let dispatched = self.dispatcher().dispatch(message);
        match dispatched {
            Dispatched::Resolved { id, method } => {
                tracing::debug!(%id, %method, "response received");
            }
            Dispatched::Dropped(_) => {}
            Dispatched::Notification(notification) => self.fan_out(&notification),
            Dispatched::ServerRequest { id, method, .. } => {
                tracing::debug!(%id, %method, "answering server request with null");
                if let Err(e) = self
                    .transport
                    .send(&JsonRpcMessage::response(id, Value::Null))
                {
                    tracing::warn!(%method, "could not answer server request: {e}");
                }
            }
        }
    }

    fn fan_out(&self, notification: &ServerNotification) {
        match notification {
            ServerNotification::LogMessage(params) => log_server_message("log", params),
            ServerNotification::ShowMessage(params) => log_server_message("show", params),
            ServerNotification::PublishDiagnostics(_) => {}
            ServerNotification::Unknown { method, .. } => {
                tracing::debug!(%method, "unhandled notification");
            }
        }
        let listeners = self.plugins().live();
        for listener in listeners {
            listener.on_notification(notification);
        }
    }

    /// Attach a document plugin so it receives notifications.
    pub fn attach_plugin(&self, listener: Weak<dyn NotificationListener>) -> PluginId {
        let id = self.plugins().attach(listener);
        tracing::debug!(plugin = id.raw(), "plugin attached");
        id
    }

    /// Detach a plugin. With `auto_close`, detaching the last one closes the
    /// session.
    pub fn detach_plugin(&self, id: PluginId) {
        let now_empty = {
            let mut plugins = self.plugins();
            // A dropped plugin may already have been pruned by a fan-out.
            plugins.detach(id);
            plugins.is_empty()
        };
        tracing::debug!(plugin = id.raw(), "plugin detached");
        if now_empty && self.options.auto_close {
            tracing::info!("last plugin detached, closing session");
            self.close();
        }
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins().len()
    }

    /// Gate on readiness and a capability flag. `Ok(false)` means "answer
    /// with nothing and send nothing".
    fn supports(&self, check: impl Fn(&LspCapabilities) -> bool) -> Result<bool, LspError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(self.is_ready() && self.capabilities().is_some_and(check))
    }

    /// Send `textDocument/didOpen`.
    pub fn text_document_did_open(
        &self,
        uri: &str,
        language_id: &str,
        version: i32,
        text: &str,
    ) -> Result<(), LspError> {
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": version,
                    "text": text
                }
            }),
        )
    }

    /// Send `textDocument/didChange` with the whole text as one change.
    pub fn text_document_did_change(
        &self,
        uri: &str,
        version: i32,
        text: &str,
    ) -> Result<(), LspError> {
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": text }]
            }),
        )
    }

    /// Send `textDocument/didSave`, optionally including the saved text.
    pub fn text_document_did_save(&self, uri: &str, text: Option<&str>) -> Result<(), LspError> {
        let mut params = json!({ "textDocument": { "uri": uri } });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        self.notify("textDocument/didSave", params)
    }

    /// Send `textDocument/didClose`.
    pub fn text_document_did_close(&self, uri: &str) -> Result<(), LspError> {
        self.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    /// Request hover information. `Ok(None)` without a wire message when
    /// the server cannot answer.
    pub async fn text_document_hover(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<Option<Hover>, LspError> {
        if !self.supports(|caps| caps.hover)? {
            return Ok(None);
        }
        let result = self
            .request(
                "textDocument/hover",
                json!({ "textDocument": { "uri": uri }, "position": position }),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| LspError::Serialization(format!("hover parse: {e}")))
    }

    /// Request completions. Accepts both `CompletionItem[]` and
    /// `CompletionList`; items that fail to decode are skipped.
    pub async fn text_document_completion(
        &self,
        uri: &str,
        position: Position,
        context: CompletionContext,
    ) -> Result<Option<Vec<CompletionItem>>, LspError> {
        if !self.supports(|caps| caps.completion)? {
            return Ok(None);
        }
        let result = self
            .request(
                "textDocument/completion",
                json!({
                    "textDocument": { "uri": uri },
                    "position": position,
                    "context": context
                }),
            )
            .await?;

        let raw_items = match result {
            Value::Null => return Ok(None),
            Value::Array(items) => items,
            Value::Object(mut list) => match list.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(LspError::Serialization(
                        "completion list without items".into(),
                    ))
                }
            },
            other => {
                return Err(LspError::Serialization(format!(
                    "unexpected completion result: {other}"
                )))
            }
        };

        let items = raw_items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<CompletionItem>(item) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("skipping malformed completion item: {e}");
                    None
                }
            })
            .collect();
        Ok(Some(items))
    }

    /// Request whole-document formatting.
    pub async fn text_document_formatting(
        &self,
        uri: &str,
        options: FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>, LspError> {
        if !self.supports(|caps| caps.formatting)? {
            return Ok(None);
        }
        let result = self
            .request(
                "textDocument/formatting",
                json!({ "textDocument": { "uri": uri }, "options": options }),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| LspError::Serialization(format!("format parse: {e}")))
    }

    /// Send the `shutdown` request and wait for the server to acknowledge.
    pub async fn shutdown(&self) -> Result<(), LspError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.state.send_replace(ClientState::ShuttingDown);
        self.send_request("shutdown", Value::Null, self.options.request_timeout)
            .await
            .map(|_| ())
    }

    /// Graceful teardown: `shutdown`, then `exit`, then close the transport.
    /// The session is unusable afterwards.
    pub async fn exit(&self) -> Result<(), LspError> {
        let shutdown = self.shutdown().await;
        if let Err(e) = &shutdown {
            if self.is_closed() {
                return shutdown;
            }
            tracing::warn!("shutdown request failed: {e}");
        }
        if let Err(e) = self.notify("exit", Value::Null) {
            tracing::warn!("exit notification failed: {e}");
        }
        self.close();
        shutdown
    }

    /// Forced teardown without the protocol handshake. Pending requests
    /// fail with a transport error.
    /// The transport lost the server. Fails everything pending and stops the
    /// session.
    fn transport_closed(&self, reason: String) {
        if self.is_closed() {
            return;
        }
        tracing::warn!("language server disconnected: {reason}");
        let _ = self.disconnected.set(reason);
        self.close();
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.send_replace(ClientState::Stopped);
        let failed = self.dispatcher().cancel_all();
        if failed > 0 {
            tracing::debug!(failed, "failed pending requests on close");
        }
        self.transport.close();
        tracing::info!("language server session closed");
    }
}

impl std::fmt::Debug for LanguageServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageServerClient")
            .field("options", &self.options)
            .field("state", &*self.state.borrow())
            .field("capabilities", &self.capabilities.get())
            .finish()
    }
}

fn log_server_message(channel: &'static str, params: &MessageParams) {
    let message = params.message.as_str();
    match params.kind {
        MessageType::Error => tracing::error!(channel, "server: {message}"),
        MessageType::Warning => tracing::warn!(channel, "server: {message}"),
        MessageType::Info => tracing::info!(channel, "server: {message}"),
        MessageType::Log => tracing::debug!(channel, "server: {message}"),
    }
}
