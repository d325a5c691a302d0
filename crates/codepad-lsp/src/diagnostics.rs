//! Translation of published diagnostics into editor coordinates.
//!
//! Protocol diagnostics carry line/character ranges; the editor wants char
//! offsets into the current text, ordered by where they start.
use std::fmt;

use codepad_core::Document;

use crate::types::{Diagnostic, DiagnosticSeverity};

/// Severity as the editor displays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        }
    }
}

impl From<Option<DiagnosticSeverity>> for Severity {
    /// Servers may omit severity; it is treated as an error.
    fn from(severity: Option<DiagnosticSeverity>) -> Self {
        match severity {
            None | Some(DiagnosticSeverity::Error) => Severity::Error,
            Some(DiagnosticSeverity::Warning) => Severity::Warning,
            Some(DiagnosticSeverity::Information) => Severity::Info,
            Some(DiagnosticSeverity::Hint) => Severity::Hint,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic positioned by char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorDiagnostic {
    pub from: usize,
    pub to: usize,
    pub severity: Severity,
    pub message: String,
    pub source: Option<String>,
}

impl fmt::Display for EditorDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} {}: {}", self.from, self.to, self.severity, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " [{source}]")?;
        }
        Ok(())
    }
}

/// Convert one diagnostic. `None` when either end of its range does not
/// exist in `document`.
pub fn translate(document: &Document, diagnostic: &Diagnostic) -> Option<EditorDiagnostic> {
    let from = document.position_to_offset(diagnostic.range.start)?;
    let to = document.position_to_offset(diagnostic.range.end)?;
    Some(EditorDiagnostic {
        from,
        to,
        severity: diagnostic.severity.into(),
        message: diagnostic.message.clone(),
        source: diagnostic.source.clone(),
    })
}

/// Convert a published batch, dropping unconvertible entries, sorted by
/// `from`. Entries starting at the same offset keep their published order.
pub fn translate_all(document: &Document, diagnostics: &[Diagnostic]) -> Vec<EditorDiagnostic> {
    let mut translated: Vec<EditorDiagnostic> = diagnostics
        .iter()
        .filter_map(|diagnostic| {
            let converted = translate(document, diagnostic);
            if converted.is_none() {
                tracing::debug!(
                    range = ?diagnostic.range,
                    "dropping diagnostic outside the document"
                );
            }
            converted
        })
        .collect();
    translated.sort_by_key(|d| d.from);
    translated
}
