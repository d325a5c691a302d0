use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, usable as an `EnvFilter` directive.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Protocol session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for ordinary requests in milliseconds. `initialize` gets
    /// three times this.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Close the session when its last document detaches.
    #[serde(default = "default_true")]
    pub auto_close: bool,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            auto_close: true,
        }
    }
}

/// Document synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period after the last edit before `didChange` is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Options sent with `textDocument/formatting`.
///
/// Many servers ignore these in favour of their own style files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattingConfig {
    /// Spaces per indentation level (1–16).
    #[serde(default = "default_tab_size")]
    pub tab_size: u8,
    /// Indent with spaces instead of tabs.
    #[serde(default = "default_true")]
    pub insert_spaces: bool,
}

fn default_tab_size() -> u8 {
    4
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            tab_size: default_tab_size(),
            insert_spaces: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// How to launch one language server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspServerEntry {
    /// The command to run the server.
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions this server handles, without the dot.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Language server table, keyed by language ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LspConfig {
    #[serde(default)]
    pub servers: HashMap<String, LspServerEntry>,
}

impl LspConfig {
    /// Find the language ID and server entry that claim `extension`.
    pub fn server_for_extension(&self, extension: &str) -> Option<(&str, &LspServerEntry)> {
        let mut matches: Vec<_> = self
            .servers
            .iter()
            .filter(|(_, entry)| entry.extensions.iter().any(|e| e == extension))
            .collect();
        // Deterministic pick when several servers claim the extension.
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches
            .into_iter()
            .next()
            .map(|(lang, entry)| (lang.as_str(), entry))
    }
}

/// Top-level codepad configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub formatting: FormattingConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub lsp: LspConfig,
}
