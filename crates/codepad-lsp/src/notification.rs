//! Server-to-client notifications the client understands.
use serde_json::Value;

use crate::types::{MessageParams, PublishDiagnosticsParams};

/// A notification pushed by the server, decoded by method name.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    /// `textDocument/publishDiagnostics`
    PublishDiagnostics(PublishDiagnosticsParams),
    /// `window/logMessage`
    LogMessage(MessageParams),
    /// `window/showMessage`
    ShowMessage(MessageParams),
    /// Any other method, or a known method whose params did not decode.
    Unknown { method: String, params: Value },
}

impl ServerNotification {
    pub const PUBLISH_DIAGNOSTICS: &'static str = "textDocument/publishDiagnostics";
    pub const LOG_MESSAGE: &'static str = "window/logMessage";
    pub const SHOW_MESSAGE: &'static str = "window/showMessage";

    /// Decode a notification envelope's method and params.
    pub fn parse(method: String, params: Value) -> Self {
        let decoded = match method.as_str() {
            Self::PUBLISH_DIAGNOSTICS => serde_json::from_value(params.clone())
                .map(ServerNotification::PublishDiagnostics),
            Self::LOG_MESSAGE => {
                serde_json::from_value(params.clone()).map(ServerNotification::LogMessage)
            }
            Self::SHOW_MESSAGE => {
                serde_json::from_value(params.clone()).map(ServerNotification::ShowMessage)
            }
            _ => return ServerNotification::Unknown { method, params },
        };
        match decoded {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(%method, "undecodable notification params: {e}");
                ServerNotification::Unknown { method, params }
            }
        }
    }

    /// The wire method name.
    pub fn method(&self) -> &str {
        match self {
            ServerNotification::PublishDiagnostics(_) => Self::PUBLISH_DIAGNOSTICS,
            ServerNotification::LogMessage(_) => Self::LOG_MESSAGE,
            ServerNotification::ShowMessage(_) => Self::SHOW_MESSAGE,
            ServerNotification::Unknown { method, .. } => method,
        }
    }
}
