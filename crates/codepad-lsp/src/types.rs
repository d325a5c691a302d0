//! LSP protocol types.
//!
//! Only the subset of the Language Server Protocol (v3.17) this client
//! speaks. Positions and ranges are the core crate's types, which already
//! serialize as `{line, character}` and `{start, end}`.
use std::fmt;

use serde::{Deserialize, Serialize};

pub use codepad_core::{Position, Range};

/// A value the protocol allows to be either an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    String(String),
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{n}"),
            NumberOrString::String(s) => f.write_str(s),
        }
    }
}

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiagnosticSeverity {
    /// Reports an error.
    Error = 1,
    /// Reports a warning.
    Warning = 2,
    /// Reports an information.
    Information = 3,
    /// Reports a hint.
    Hint = 4,
}

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(DiagnosticSeverity::Error),
            2 => Ok(DiagnosticSeverity::Warning),
            3 => Ok(DiagnosticSeverity::Information),
            4 => Ok(DiagnosticSeverity::Hint),
            other => Err(format!("unknown diagnostic severity {other}")),
        }
    }
}

impl From<DiagnosticSeverity> for u8 {
    fn from(severity: DiagnosticSeverity) -> u8 {
        severity as u8
    }
}

/// A diagnostic message from the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The range at which the diagnostic applies.
    pub range: Range,
    /// The severity of the diagnostic. Servers may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    /// The diagnostic's code (string or number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<NumberOrString>,
    /// The diagnostic's source (e.g. "clang", "pyflakes").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The diagnostic's message.
    pub message: String,
}

/// Params of `textDocument/publishDiagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    /// Document version the diagnostics were computed for, if the server
    /// says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Completion item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CompletionItemKind {
    Text = 1,
    Method = 2,
    Function = 3,
    Constructor = 4,
    Field = 5,
    Variable = 6,
    Class = 7,
    Interface = 8,
    Module = 9,
    Property = 10,
    Unit = 11,
    Value = 12,
    Enum = 13,
    Keyword = 14,
    Snippet = 15,
    Color = 16,
    File = 17,
    Reference = 18,
    Folder = 19,
    EnumMember = 20,
    Constant = 21,
    Struct = 22,
    Event = 23,
    Operator = 24,
    TypeParameter = 25,
}

impl CompletionItemKind {
    const ALL: [CompletionItemKind; 25] = [
        Self::Text,
        Self::Method,
        Self::Function,
        Self::Constructor,
        Self::Field,
        Self::Variable,
        Self::Class,
        Self::Interface,
        Self::Module,
        Self::Property,
        Self::Unit,
        Self::Value,
        Self::Enum,
        Self::Keyword,
        Self::Snippet,
        Self::Color,
        Self::File,
        Self::Reference,
        Self::Folder,
        Self::EnumMember,
        Self::Constant,
        Self::Struct,
        Self::Event,
        Self::Operator,
        Self::TypeParameter,
    ];

    /// Lowercase name for display in a completion menu.
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Method => "method",
            Self::Function => "function",
            Self::Constructor => "constructor",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Module => "module",
            Self::Property => "property",
            Self::Unit => "unit",
            Self::Value => "value",
            Self::Enum => "enum",
            Self::Keyword => "keyword",
            Self::Snippet => "snippet",
            Self::Color => "color",
            Self::File => "file",
            Self::Reference => "reference",
            Self::Folder => "folder",
            Self::EnumMember => "enum member",
            Self::Constant => "constant",
            Self::Struct => "struct",
            Self::Event => "event",
            Self::Operator => "operator",
            Self::TypeParameter => "type parameter",
        }
    }
}

impl TryFrom<u8> for CompletionItemKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| *kind as u8 == value)
            .ok_or_else(|| format!("unknown completion item kind {value}"))
    }
}

impl From<CompletionItemKind> for u8 {
    fn from(kind: CompletionItemKind) -> u8 {
        kind as u8
    }
}

/// The text part of a completion edit.
///
/// Servers send either a `TextEdit` or an `InsertReplaceEdit`; both carry
/// `newText`, which is all the client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionTextEdit {
    pub new_text: String,
}

/// A completion item returned by the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    /// The label of this completion item.
    pub label: String,
    /// The kind of this completion item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletionItemKind>,
    /// A human-readable string with additional information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Text inserted when `text_edit` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    /// An edit applied when selecting this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_edit: Option<CompletionTextEdit>,
    /// Sort key; the label is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    /// Filter key; the label is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<String>,
}

/// How a completion request was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CompletionTriggerKind {
    /// Typed an identifier character or invoked explicitly.
    Invoked = 1,
    /// Typed one of the server's trigger characters.
    TriggerCharacter = 2,
    /// Re-triggered for an incomplete result.
    TriggerForIncompleteCompletions = 3,
}

impl TryFrom<u8> for CompletionTriggerKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(CompletionTriggerKind::Invoked),
            2 => Ok(CompletionTriggerKind::TriggerCharacter),
            3 => Ok(CompletionTriggerKind::TriggerForIncompleteCompletions),
            other => Err(format!("unknown completion trigger kind {other}")),
        }
    }
}

impl From<CompletionTriggerKind> for u8 {
    fn from(kind: CompletionTriggerKind) -> u8 {
        kind as u8
    }
}

/// Context sent with `textDocument/completion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionContext {
    pub trigger_kind: CompletionTriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_character: Option<String>,
}

impl CompletionContext {
    pub fn invoked() -> Self {
        Self {
            trigger_kind: CompletionTriggerKind::Invoked,
            trigger_character: None,
        }
    }

    pub fn trigger_character(ch: char) -> Self {
        Self {
            trigger_kind: CompletionTriggerKind::TriggerCharacter,
            trigger_character: Some(ch.to_string()),
        }
    }
}

/// Markup content for hover results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupContent {
    /// `plaintext` or `markdown`.
    pub kind: String,
    pub value: String,
}

/// The deprecated `MarkedString`: a plain string or a code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkedString {
    String(String),
    LanguageString { language: String, value: String },
}

impl MarkedString {
    fn text(&self) -> &str {
        match self {
            MarkedString::String(s) => s,
            MarkedString::LanguageString { value, .. } => value,
        }
    }
}

/// Every shape `Hover.contents` may take on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoverContents {
    Markup(MarkupContent),
    Scalar(MarkedString),
    Array(Vec<MarkedString>),
}

impl HoverContents {
    /// Flatten to displayable text. Array entries are separated by a blank
    /// line.
    pub fn to_text(&self) -> String {
        match self {
            HoverContents::Markup(markup) => markup.value.clone(),
            HoverContents::Scalar(marked) => marked.text().to_string(),
            HoverContents::Array(items) => items
                .iter()
                .map(MarkedString::text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Hover information from the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// The hover's content.
    pub contents: HoverContents,
    /// The range the hover applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

/// A text edit to be applied to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    /// The range of the text document to be manipulated.
    pub range: Range,
    /// The string to be inserted.
    pub new_text: String,
}

/// Options sent with `textDocument/formatting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

/// A workspace folder announced in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: String,
    pub name: String,
}

/// Severity of a `window/logMessage` or `window/showMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(MessageType::Error),
            2 => Ok(MessageType::Warning),
            3 => Ok(MessageType::Info),
            4 => Ok(MessageType::Log),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> u8 {
        kind as u8
    }
}

/// Params of `window/logMessage` and `window/showMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub message: String,
}

/// Negotiated capabilities after initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LspCapabilities {
    /// Server supports completion.
    pub completion: bool,
    /// Characters that trigger completion without an explicit request.
    pub completion_trigger_characters: Vec<String>,
    /// Server supports hover.
    pub hover: bool,
    /// Server supports whole-document formatting.
    pub formatting: bool,
    /// Server supports signature help.
    pub signature_help: bool,
}

impl LspCapabilities {
    /// Create capabilities from the `capabilities` object of an
    /// `initialize` result.
    pub fn from_server_capabilities(caps: &serde_json::Value) -> Self {
        let completion_trigger_characters = caps
            .pointer("/completionProvider/triggerCharacters")
            .and_then(|v| v.as_array())
            .map(|chars| {
                chars
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            completion: provider_enabled(caps, "completionProvider"),
            completion_trigger_characters,
            hover: provider_enabled(caps, "hoverProvider"),
            formatting: provider_enabled(caps, "documentFormattingProvider"),
            signature_help: provider_enabled(caps, "signatureHelpProvider"),
        }
    }

    /// Whether `ch` is one of the server's completion trigger characters.
    pub fn is_trigger_character(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        let ch = ch.encode_utf8(&mut buf);
        self.completion_trigger_characters.iter().any(|t| t == ch)
    }
}

/// A provider is enabled when it is `true` or an options object.
fn provider_enabled(caps: &serde_json::Value, key: &str) -> bool {
    match caps.get(key) {
        Some(serde_json::Value::Bool(enabled)) => *enabled,
        Some(serde_json::Value::Object(_)) => true,
        _ => false,
    }
}

/// Client capabilities sent during initialization.
pub fn client_capabilities() -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "hover": {
                "dynamicRegistration": true,
                "contentFormat": ["plaintext", "markdown"]
            },
            "completion": {
                "dynamicRegistration": true,
                "completionItem": {
                    "snippetSupport": false,
                    "commitCharactersSupport": true,
                    "documentationFormat": ["plaintext", "markdown"],
                    "deprecatedSupport": false,
                    "preselectSupport": false
                },
                "contextSupport": true
            },
            "signatureHelp": {
                "dynamicRegistration": true,
                "signatureInformation": {
                    "documentationFormat": ["plaintext", "markdown"]
                }
            },
            "declaration": {
                "dynamicRegistration": true,
                "linkSupport": true
            },
            "definition": {
                "dynamicRegistration": true,
                "linkSupport": true
            },
            "typeDefinition": {
                "dynamicRegistration": true,
                "linkSupport": true
            },
            "implementation": {
                "dynamicRegistration": true,
                "linkSupport": true
            },
            "formatting": {
                "dynamicRegistration": true
            },
            "synchronization": {
                "dynamicRegistration": false,
                "didSave": true,
                "willSave": false,
                "willSaveWaitUntil": false
            },
            "publishDiagnostics": {
                "relatedInformation": false,
                "versionSupport": false
            }
        },
        "workspace": {
            "didChangeConfiguration": {
                "dynamicRegistration": true
            }
        }
    })
}
