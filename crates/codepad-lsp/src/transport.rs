//! JSON-RPC envelopes, Content-Length framing and the transport seam.
//!
//! A [`Transport`] carries whole envelopes. Byte-stream transports (see
//! [`crate::stdio`]) frame them with Content-Length headers as the LSP
//! base protocol requires.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LspError;

/// Identifier correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID, as assigned by this client.
    Number(i64),
    /// String ID, as some servers use for their own requests.
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A JSON-RPC message (request, response, or notification).
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A request (has id and method).
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    /// A response (has id, carries a result or an error).
    Response {
        id: RequestId,
        result: Option<Value>,
        error: Option<RpcError>,
    },
    /// A notification (has method, no id).
    Notification { method: String, params: Value },
}

/// An error object in a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcMessage {
    pub fn request(id: impl Into<RequestId>, method: &str, params: Value) -> Self {
        JsonRpcMessage::Request {
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        JsonRpcMessage::Notification {
            method: method.to_string(),
            params,
        }
    }

    /// A successful response.
    pub fn response(id: impl Into<RequestId>, result: Value) -> Self {
        JsonRpcMessage::Response {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    pub fn error_response(id: impl Into<RequestId>, code: i32, message: &str) -> Self {
        JsonRpcMessage::Response {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
            }),
        }
    }

    /// The method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request { method, .. } | JsonRpcMessage::Notification { method, .. } => {
                Some(method.as_str())
            }
            JsonRpcMessage::Response { .. } => None,
        }
    }

    /// The params of requests and notifications.
    pub fn params(&self) -> Option<&Value> {
        match self {
            JsonRpcMessage::Request { params, .. }
            | JsonRpcMessage::Notification { params, .. } => Some(params),
            JsonRpcMessage::Response { .. } => None,
        }
    }

    /// Build the `{"jsonrpc":"2.0", ...}` envelope.
    pub fn to_value(&self) -> Value {
        match self {
            JsonRpcMessage::Request { id, method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params
            }),
            JsonRpcMessage::Notification { method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params
            }),
            JsonRpcMessage::Response {
                id,
                error: Some(error),
                ..
            } => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": error
            }),
            JsonRpcMessage::Response { id, result, .. } => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result.clone().unwrap_or(Value::Null)
            }),
        }
    }

    /// Serialize the envelope to a JSON string.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// Receives every envelope that arrives from the server.
pub type MessageListener = Arc<dyn Fn(JsonRpcMessage) + Send + Sync>;

/// Called once when the server side of the channel goes away, with a
/// short reason.
pub type CloseListener = Arc<dyn Fn(String) + Send + Sync>;

/// A bidirectional channel carrying JSON-RPC envelopes to and from one
/// server.
///
/// `send` never blocks; implementations queue the envelope and write it
/// from their own task or hand it to their host.
pub trait Transport: Send + Sync {
    /// Queue an envelope for the server.
    fn send(&self, message: &JsonRpcMessage) -> Result<(), LspError>;

    /// Register the single listener that receives server envelopes.
    /// Replaces any previous listener.
    fn set_listener(&self, listener: MessageListener);

    /// Register the listener told when the server disconnects (process
    /// exit, EOF, read error). Not called for [`close`](Self::close).
    fn set_close_listener(&self, listener: CloseListener) {
        let _ = listener;
    }

    /// Tear the channel down. Further sends fail.
    fn close(&self);

    /// Push a file into the server's virtual filesystem before the session
    /// starts. Only in-process transports support this.
    fn write_file(&self, path: &str, contents: &str) -> Result<(), LspError> {
        let _ = contents;
        Err(LspError::Unsupported(format!("write_file {path}")))
    }
}

/// Frame a JSON-RPC message body with a Content-Length header.
pub fn frame_message(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

/// Parse the Content-Length value from raw header text.
pub fn parse_content_length(header: &str) -> Result<usize, LspError> {
    for line in header.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|_| {
                LspError::InvalidMessage(format!("invalid Content-Length: {value}"))
            });
        }
    }
    Err(LspError::InvalidMessage(
        "missing Content-Length header".to_string(),
    ))
}

/// Parse a JSON-RPC message from a JSON string.
pub fn parse_message(json_str: &str) -> Result<JsonRpcMessage, LspError> {
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| LspError::Serialization(format!("invalid JSON: {e}")))?;
    message_from_value(value)
}

/// Classify a decoded envelope by the presence of `id` and `method`.
pub fn message_from_value(mut value: Value) -> Result<JsonRpcMessage, LspError> {
    let id = match value.get_mut("id").map(Value::take) {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<RequestId>(raw)
                .map_err(|_| LspError::InvalidMessage("id must be a number or string".into()))?,
        ),
    };
    let method = match value.get("method") {
        None => None,
        Some(m) => Some(
            m.as_str()
                .ok_or_else(|| LspError::InvalidMessage("method must be a string".into()))?
                .to_string(),
        ),
    };
    let params = value
        .get_mut("params")
        .map(Value::take)
        .unwrap_or(Value::Null);

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessage::Request { id, method, params }),
        (Some(id), None) => {
            let result = value.get_mut("result").map(Value::take);
            let error = match value.get_mut("error").map(Value::take) {
                None | Some(Value::Null) => None,
                Some(e) => Some(serde_json::from_value::<RpcError>(e).map_err(|e| {
                    LspError::InvalidMessage(format!("malformed error object: {e}"))
                })?),
            };
            Ok(JsonRpcMessage::Response { id, result, error })
        }
        (None, Some(method)) => Ok(JsonRpcMessage::Notification { method, params }),
        (None, None) => Err(LspError::InvalidMessage(
            "message has neither id nor method".to_string(),
        )),
    }
}

/// Read a single LSP message from raw bytes (header + body).
///
/// Returns the parsed message and the number of bytes consumed.
pub fn read_message_from_bytes(input: &[u8]) -> Result<(JsonRpcMessage, usize), LspError> {
    let header_end = input
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| LspError::InvalidMessage("incomplete header".into()))?;

    let header = std::str::from_utf8(&input[..header_end])
        .map_err(|_| LspError::InvalidMessage("invalid UTF-8 in header".into()))?;
    let content_length = parse_content_length(header)?;

    let body_start = header_end + 4;
    let body_end = body_start + content_length;
    if input.len() < body_end {
        return Err(LspError::InvalidMessage(format!(
            "incomplete body: expected {} bytes, got {}",
            content_length,
            input.len() - body_start
        )));
    }

    let body = std::str::from_utf8(&input[body_start..body_end])
        .map_err(|_| LspError::InvalidMessage("invalid UTF-8 in body".into()))?;
    let msg = parse_message(body)?;
    Ok((msg, body_end))
}
