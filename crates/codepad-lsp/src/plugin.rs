//! Per-document glue between an editor buffer and a language server session.
//!
//! A plugin opens its document once the session is ready, keeps the server's
//! copy in sync with debounced full-text changes, answers hover, completion
//! and formatting queries in char offsets, and hands translated diagnostics
//! to the editor.
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use codepad_core::{Document, TextChange};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::{ClientOptions, LanguageServerClient};
use crate::completion::{self, CompletionOption, CompletionRequest, CompletionResult};
use crate::diagnostics::{self, EditorDiagnostic};
use crate::error::LspError;
use crate::notification::ServerNotification;
use crate::registry::{NotificationListener, PluginId};
use crate::types::{CompletionContext, FormattingOptions};

/// Quiet period after the last edit before `didChange` is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Receives every diagnostics batch for the plugin's document.
pub type DiagnosticsCallback = Box<dyn Fn(Vec<EditorDiagnostic>) + Send + Sync>;

/// Settings for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    pub document_uri: String,
    pub language_id: String,
    pub debounce: Duration,
    pub formatting: FormattingOptions,
}

impl PluginConfig {
    pub fn new(document_uri: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            document_uri: document_uri.into(),
            language_id: language_id.into(),
            debounce: DEFAULT_DEBOUNCE,
            formatting: FormattingOptions::default(),
        }
    }

    /// The document a session was created for.
    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.document_uri.clone(), options.language_id.clone())
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_formatting(mut self, formatting: FormattingOptions) -> Self {
        self.formatting = formatting;
        self
    }
}

/// Hover information anchored in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverTooltip {
    pub from: usize,
    /// End of the hovered range when the server reported one.
    pub to: Option<usize>,
    pub contents: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Pending,
    Open,
    Failed,
    Closed,
}

/// Binds one document to a [`LanguageServerClient`].
pub struct LanguageServerPlugin {
    client: Arc<LanguageServerClient>,
    config: PluginConfig,
    document: Mutex<Document>,
    /// Set by edits not yet sent to the server. Guarded by `document`.
    dirty: AtomicBool,
    version: AtomicI32,
    open: watch::Sender<OpenState>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    plugin_id: OnceLock<PluginId>,
    on_diagnostics: DiagnosticsCallback,
}

impl LanguageServerPlugin {
    /// Attach a document to `client` and spawn its `didOpen`, sent once the
    /// session is ready.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        client: Arc<LanguageServerClient>,
        config: PluginConfig,
        initial_text: &str,
        on_diagnostics: impl Fn(Vec<EditorDiagnostic>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (open, _) = watch::channel(OpenState::Pending);
        let plugin = Arc::new(Self {
            client: client.clone(),
            config,
            document: Mutex::new(Document::from_text(initial_text)),
            dirty: AtomicBool::new(false),
            version: AtomicI32::new(0),
            open,
            debounce: Mutex::new(None),
            plugin_id: OnceLock::new(),
            on_diagnostics: Box::new(on_diagnostics),
        });

        let listener: Arc<dyn NotificationListener> = plugin.clone();
        let id = client.attach_plugin(Arc::downgrade(&listener));
        let _ = plugin.plugin_id.set(id);

        let weak = Arc::downgrade(&plugin);
        tokio::spawn(async move {
            let ready = client.wait_ready().await;
            if let Some(plugin) = weak.upgrade() {
                plugin.open_document(ready);
            }
        });
        plugin
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<LanguageServerClient> {
        &self.client
    }

    /// Version of the last `didChange` sent; 0 until the first one.
    pub fn document_version(&self) -> i32 {
        self.version.load(Ordering::Acquire)
    }

    /// The plugin's copy of the document text.
    pub fn text(&self) -> String {
        self.document().text()
    }

    /// Whether `didOpen` has gone out and the document is not closed.
    pub fn is_open(&self) -> bool {
        *self.open.borrow() == OpenState::Open
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debounce_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.debounce.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_document(&self, ready: Result<(), LspError>) {
        if *self.open.borrow() != OpenState::Pending {
            return;
        }
        let next = match ready {
            Ok(()) => {
                let document = self.document();
                self.dirty.store(false, Ordering::Release);
                let sent = self.client.text_document_did_open(
                    &self.config.document_uri,
                    &self.config.language_id,
                    0,
                    &document.text(),
                );
                drop(document);
                match sent {
                    Ok(()) => {
                        tracing::debug!(uri = %self.config.document_uri, "document opened");
                        OpenState::Open
                    }
                    Err(e) => {
                        tracing::warn!(uri = %self.config.document_uri, "didOpen failed: {e}");
                        OpenState::Failed
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    uri = %self.config.document_uri,
                    "not opening document, session unavailable: {e}"
                );
                OpenState::Failed
            }
        };
        self.open.send_if_modified(|state| {
            if *state == OpenState::Pending {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Wait until the open attempt settled. `true` if the document is open.
    pub async fn wait_open(&self) -> bool {
        let mut rx = self.open.subscribe();
        let open = match rx.wait_for(|state| *state != OpenState::Pending).await {
            Ok(state) => *state == OpenState::Open,
            Err(_) => false,
        };
        open
    }

    /// Record a new document text and (re)start the debounce window.
    pub fn document_changed(self: &Arc<Self>, text: &str) {
        {
            let mut document = self.document();
            document.set_text(text);
            self.dirty.store(true, Ordering::Release);
        }

        let weak = Arc::downgrade(self);
        let delay = self.config.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(plugin) = weak.upgrade() else {
                return;
            };
            if plugin.wait_open().await {
                if let Err(e) = plugin.send_pending_change() {
                    tracing::warn!(uri = %plugin.config.document_uri, "didChange failed: {e}");
                }
            }
        });
        if let Some(previous) = self.debounce_slot().replace(task) {
            previous.abort();
        }
    }

    /// Send the current text if edits are pending.
    ///
    /// The document lock is held until the notification is queued so
    /// versions reach the transport in increasing order.
    fn send_pending_change(&self) -> Result<(), LspError> {
        let document = self.document();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(uri = %self.config.document_uri, version, "sending didChange");
        self.client
            .text_document_did_change(&self.config.document_uri, version, &document.text())
    }

    /// Cancel the debounce window and send pending edits right away.
    pub fn flush(&self) -> Result<(), LspError> {
        if let Some(pending) = self.debounce_slot().take() {
            pending.abort();
        }
        if self.is_open() {
            self.send_pending_change()?;
        }
        Ok(())
    }

    /// Hover at a char offset.
    pub async fn hover(&self, offset: usize) -> Result<Option<HoverTooltip>, LspError> {
        self.flush()?;
        let Some(position) = self.document().offset_to_position(offset) else {
            return Ok(None);
        };
        let Some(hover) = self
            .client
            .text_document_hover(&self.config.document_uri, position)
            .await?
        else {
            return Ok(None);
        };

        let contents = hover.contents.to_text();
        match hover.range {
            None => Ok(Some(HoverTooltip {
                from: offset,
                to: None,
                contents,
            })),
            Some(range) => {
                let document = self.document();
                let (Some(from), Some(to)) = (
                    document.position_to_offset(range.start),
                    document.position_to_offset(range.end),
                ) else {
                    tracing::debug!(?range, "hover range outside the document");
                    return Ok(None);
                };
                Ok(Some(HoverTooltip {
                    from,
                    to: Some(to),
                    contents,
                }))
            }
        }
    }

    /// Completion at the request's offset, narrowed to the typed prefix.
    pub async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<CompletionResult>, LspError> {
        self.flush()?;
        let (position, previous, line_before) = {
            let document = self.document();
            let Some(position) = document.offset_to_position(request.offset) else {
                return Ok(None);
            };
            (
                position,
                document.char_before(request.offset),
                document.line_text_before(request.offset).unwrap_or_default(),
            )
        };

        let trigger = previous.filter(|&ch| {
            !request.explicit
                && self
                    .client
                    .capabilities()
                    .is_some_and(|caps| caps.is_trigger_character(ch))
        });
        if !request.explicit && trigger.is_none() && !completion::ends_with_word(&line_before) {
            return Ok(None);
        }
        let context = match trigger {
            Some(ch) => CompletionContext::trigger_character(ch),
            None => CompletionContext::invoked(),
        };

        let Some(items) = self
            .client
            .text_document_completion(&self.config.document_uri, position, context)
            .await?
        else {
            return Ok(None);
        };
        let options: Vec<CompletionOption> =
            items.into_iter().map(CompletionOption::from).collect();
        Ok(Some(completion::filter_by_prefix(
            options,
            &line_before,
            request.offset,
        )))
    }

    /// Whole-document formatting as offset-based changes against the
    /// current text.
    pub async fn format(&self) -> Result<Option<Vec<TextChange>>, LspError> {
        self.flush()?;
        let Some(edits) = self
            .client
            .text_document_formatting(&self.config.document_uri, self.config.formatting)
            .await?
        else {
            return Ok(None);
        };

        let document = self.document();
        let changes = edits
            .into_iter()
            .filter_map(|edit| {
                match (
                    document.position_to_offset(edit.range.start),
                    document.position_to_offset(edit.range.end),
                ) {
                    (Some(from), Some(to)) if from <= to => {
                        Some(TextChange::new(from, to, edit.new_text))
                    }
                    _ => {
                        tracing::warn!(range = ?edit.range, "dropping invalid format edit");
                        None
                    }
                }
            })
            .collect();
        Ok(Some(changes))
    }

    /// Send pending edits, then `didSave`.
    pub async fn did_save(&self) -> Result<(), LspError> {
        self.flush()?;
        if !self.is_open() {
            return Ok(());
        }
        self.client
            .text_document_did_save(&self.config.document_uri, None)
    }

    /// Stop syncing: cancel pending edits, send `didClose` if the document
    /// was opened and the session still runs, and detach from the session.
    pub fn destroy(&self) {
        if let Some(pending) = self.debounce_slot().take() {
            pending.abort();
        }
        let previous = self.open.send_replace(OpenState::Closed);
        if previous == OpenState::Closed {
            return;
        }
        if previous == OpenState::Open && self.client.is_ready() {
            if let Err(e) = self
                .client
                .text_document_did_close(&self.config.document_uri)
            {
                tracing::warn!(uri = %self.config.document_uri, "didClose failed: {e}");
            }
        }
        if let Some(id) = self.plugin_id.get() {
            self.client.detach_plugin(*id);
        }
    }
}

impl NotificationListener for LanguageServerPlugin {
    fn on_notification(&self, notification: &ServerNotification) {
        let ServerNotification::PublishDiagnostics(params) = notification else {
            return;
        };
        if params.uri != self.config.document_uri || *self.open.borrow() == OpenState::Closed {
            return;
        }
        let translated = diagnostics::translate_all(&self.document(), &params.diagnostics);
        tracing::debug!(
            uri = %params.uri,
            published = params.diagnostics.len(),
            kept = translated.len(),
            "diagnostics received"
        );
        (self.on_diagnostics)(translated);
    }
}

impl Drop for LanguageServerPlugin {
    fn drop(&mut self) {
        if let Some(pending) = self.debounce_slot().take() {
            pending.abort();
        }
        if *self.open.borrow() == OpenState::Closed {
            return;
        }
        if let Some(id) = self.plugin_id.get() {
            tracing::debug!(uri = %self.config.document_uri, "plugin dropped without destroy");
            self.client.detach_plugin(*id);
        }
    }
}

impl std::fmt::Debug for LanguageServerPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageServerPlugin")
            .field("config", &self.config)
            .field("version", &self.document_version())
            .field("open", &*self.open.borrow())
            .finish_non_exhaustive()
    }
}
