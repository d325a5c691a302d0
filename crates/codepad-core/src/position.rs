use std::fmt;

/// A zero-based line/character position.
///
/// `character` counts UTF-16 code units from the start of the line, which is
/// the default position encoding of the Language Server Protocol.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
    Hash,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    /// Create a new position at the given 0-based line and character.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A half-open range between two positions.
///
/// Unlike an editor selection this is a plain wire value: no ordering is
/// enforced, since servers may send anything.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
    Hash,
)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Returns `true` if start == end.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `pos` is inside the range (start inclusive,
    /// end exclusive).
    pub fn contains(&self, pos: Position) -> bool {
        pos >= self.start && pos < self.end
    }
}

/// A replacement of the char range `from..to` with `insert`.
///
/// Offsets are char indices into the document, the unit every editor-facing
/// API in this workspace uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextChange {
    pub from: usize,
    pub to: usize,
    pub insert: String,
}

impl TextChange {
    pub fn new(from: usize, to: usize, insert: impl Into<String>) -> Self {
        Self {
            from,
            to,
            insert: insert.into(),
        }
    }

    /// Pure insertion at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }
}
