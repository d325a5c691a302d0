//! LSP error types.

/// Errors from LSP client operations.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// No response arrived before the deadline.
    #[error("request {method} timed out after {timeout_ms} ms")]
    RequestTimeout {
        /// The method of the request that timed out.
        method: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The channel to the server is closed or failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Protocol {
        /// The error code.
        code: i32,
        /// The error message.
        message: String,
    },

    /// Server initialization handshake failed.
    #[error("server initialization failed: {0}")]
    InitFailed(String),

    /// Server process failed to start.
    #[error("server failed to start: {0}")]
    SpawnFailed(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame or envelope that is not valid JSON-RPC.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The transport does not offer the requested primitive.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LspError {
    /// The error returned by any call on a session after `exit` or `close`.
    pub fn closed() -> Self {
        LspError::Transport("session closed".to_string())
    }
}
