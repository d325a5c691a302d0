//! codepad-lsp — Language Server Protocol client for codepad.
//!
//! A [`LanguageServerClient`] speaks JSON-RPC to one server over a
//! [`Transport`]; each open document is bound to it by a
//! [`LanguageServerPlugin`] that syncs text and answers editor queries in
//! char offsets.
pub mod client;
pub mod completion;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod notification;
pub mod plugin;
pub mod registry;
pub mod stdio;
pub mod transport;
pub mod types;

// Re-export key types for convenience.
pub use client::{ClientOptions, ClientState, LanguageServerClient};
pub use completion::{CompletionOption, CompletionRequest, CompletionResult};
pub use diagnostics::{EditorDiagnostic, Severity};
pub use error::LspError;
pub use memory::MemoryTransport;
pub use notification::ServerNotification;
pub use plugin::{HoverTooltip, LanguageServerPlugin, PluginConfig};
pub use registry::{NotificationListener, PluginId};
pub use stdio::StdioTransport;
pub use transport::{
    CloseListener, JsonRpcMessage, MessageListener, RequestId, RpcError, Transport,
};
pub use types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, FormattingOptions, Hover,
    LspCapabilities, MarkupContent, Position, Range, TextEdit, WorkspaceFolder,
};
