//! Rope-backed document text with LSP coordinate translation.
//!
//! Editor offsets are char indices. LSP positions count UTF-16 code units
//! within a line. Line breaks are `\n`, `\r\n` and `\r`.
use ropey::Rope;

use crate::error::CoreError;
use crate::position::{Position, TextChange};

/// Immutable-by-default view of a document's text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    rope: Rope,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from a text string.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Reference to the underlying rope.
    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// The full text as an owned string.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Replace the whole text.
    pub fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
    }

    /// Length in chars.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Number of lines. A trailing line break starts a new, empty line.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Convert a char offset to an LSP position.
    ///
    /// Returns `None` when `offset` is past the end of the document.
    pub fn offset_to_position(&self, offset: usize) -> Option<Position> {
        if offset > self.rope.len_chars() {
            return None;
        }
        let line = self.rope.char_to_line(offset);
        let line_start = self.rope.line_to_char(line);
        let character =
            self.rope.char_to_utf16_cu(offset) - self.rope.char_to_utf16_cu(line_start);
        Some(Position::new(
            u32::try_from(line).ok()?,
            u32::try_from(character).ok()?,
        ))
    }

    /// Convert an LSP position to a char offset.
    ///
    /// The character is added linearly to the start of its line, so a
    /// character past the line end lands on a following line. Returns `None`
    /// when the line does not exist or the result is past the end of the
    /// document.
    pub fn position_to_offset(&self, pos: Position) -> Option<usize> {
        let line = pos.line as usize;
        if line >= self.rope.len_lines() {
            return None;
        }
        let line_start = self.rope.char_to_utf16_cu(self.rope.line_to_char(line));
        let target = line_start + pos.character as usize;
        if target > self.rope.len_utf16_cu() {
            return None;
        }
        Some(self.rope.utf16_cu_to_char(target))
    }

    /// The char immediately before `offset`, if any.
    pub fn char_before(&self, offset: usize) -> Option<char> {
        if offset == 0 || offset > self.rope.len_chars() {
            return None;
        }
        Some(self.rope.char(offset - 1))
    }

    /// Text of the line containing `offset`, from the line start up to
    /// `offset`.
    pub fn line_text_before(&self, offset: usize) -> Option<String> {
        if offset > self.rope.len_chars() {
            return None;
        }
        let line_start = self.rope.line_to_char(self.rope.char_to_line(offset));
        Some(self.rope.slice(line_start..offset).to_string())
    }

    /// Apply a batch of non-overlapping changes expressed against the
    /// current text.
    ///
    /// Changes may come in any order. Insertions at the same offset keep
    /// their batch order. Nothing is applied if any change is invalid.
    pub fn apply_changes(&mut self, changes: &[TextChange]) -> Result<(), CoreError> {
        let len = self.rope.len_chars();
        let mut ordered: Vec<&TextChange> = changes.iter().collect();
        for change in &ordered {
            if change.from > change.to {
                return Err(CoreError::InvalidRange {
                    from: change.from,
                    to: change.to,
                });
            }
            if change.to > len {
                return Err(CoreError::OutOfBounds {
                    offset: change.to,
                    len,
                });
            }
        }
        ordered.sort_by_key(|c| c.from);
        for pair in ordered.windows(2) {
            if pair[1].from < pair[0].to {
                return Err(CoreError::OverlappingChanges(pair[1].from));
            }
        }
        for change in ordered.iter().rev() {
            self.rope.remove(change.from..change.to);
            self.rope.insert(change.from, &change.insert);
        }
        Ok(())
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_to_position_single_line() {
        let doc = Document::from_text("int x = 1;");
        assert_eq!(doc.offset_to_position(0), Some(Position::new(0, 0)));
        assert_eq!(doc.offset_to_position(4), Some(Position::new(0, 4)));
        assert_eq!(doc.offset_to_position(10), Some(Position::new(0, 10)));
    }

    #[test]
    fn offset_to_position_past_end_is_none() {
        let doc = Document::from_text("abc");
        assert_eq!(doc.offset_to_position(4), None);
    }

    #[test]
    fn offset_to_position_multi_line() {
        let doc = Document::from_text("hello\nworld\n");
        assert_eq!(doc.offset_to_position(5), Some(Position::new(0, 5)));
        assert_eq!(doc.offset_to_position(6), Some(Position::new(1, 0)));
        assert_eq!(doc.offset_to_position(8), Some(Position::new(1, 2)));
        assert_eq!(doc.offset_to_position(12), Some(Position::new(2, 0)));
    }

    #[test]
    fn position_to_offset_multi_line() {
        let doc = Document::from_text("hello\nworld\n");
        assert_eq!(doc.position_to_offset(Position::new(1, 2)), Some(8));
        assert_eq!(doc.position_to_offset(Position::new(2, 0)), Some(12));
    }

    #[test]
    fn position_to_offset_missing_line_is_none() {
        let doc = Document::from_text("one line");
        assert_eq!(doc.position_to_offset(Position::new(1, 0)), None);
        assert_eq!(doc.position_to_offset(Position::new(7, 3)), None);
    }

    #[test]
    fn position_to_offset_past_document_end_is_none() {
        let doc = Document::from_text("abc");
        assert_eq!(doc.position_to_offset(Position::new(0, 3)), Some(3));
        assert_eq!(doc.position_to_offset(Position::new(0, 4)), None);
    }

    #[test]
    fn position_to_offset_spills_past_line_end() {
        let doc = Document::from_text("ab\ncd");
        assert_eq!(doc.position_to_offset(Position::new(0, 4)), Some(4));
    }

    #[test]
    fn utf16_surrogate_pairs_count_twice() {
        let doc = Document::from_text("a\u{1F600}b");
        assert_eq!(doc.offset_to_position(2), Some(Position::new(0, 3)));
        assert_eq!(doc.position_to_offset(Position::new(0, 3)), Some(2));
    }

    #[test]
    fn crlf_is_a_single_line_break() {
        let doc = Document::from_text("ab\r\ncd");
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.offset_to_position(4), Some(Position::new(1, 0)));
        assert_eq!(doc.position_to_offset(Position::new(1, 1)), Some(5));
    }

    #[test]
    fn offset_position_round_trip() {
        let texts = [
            "",
            "int x = 1;",
            "fn main() {\n    let x = 1;\n}\n",
            "a\r\nb\rc\n",
            "caf\u{00E9} \u{1F600}\n\u{4E2D}\u{6587}",
        ];
        for text in texts {
            let doc = Document::from_text(text);
            for offset in 0..=doc.len_chars() {
                let pos = doc.offset_to_position(offset).unwrap();
                assert_eq!(
                    doc.position_to_offset(pos),
                    Some(offset),
                    "round trip failed for {text:?} at {offset}"
                );
            }
        }
    }

    #[test]
    fn char_before_and_line_text_before() {
        let doc = Document::from_text("foo\nbar.baz");
        assert_eq!(doc.char_before(0), None);
        assert_eq!(doc.char_before(8), Some('.'));
        assert_eq!(doc.line_text_before(8).as_deref(), Some("bar."));
        assert_eq!(doc.line_text_before(4).as_deref(), Some(""));
        assert_eq!(doc.line_text_before(99), None);
    }

    #[test]
    fn apply_changes_any_order() {
        let mut doc = Document::from_text("int  x=1;");
        doc.apply_changes(&[
            TextChange::new(6, 7, " = "),
            TextChange::new(3, 5, " "),
        ])
        .unwrap();
        assert_eq!(doc.text(), "int x = 1;");
    }

    #[test]
    fn apply_changes_same_offset_inserts_keep_order() {
        let mut doc = Document::from_text("ac");
        doc.apply_changes(&[TextChange::insert(1, "b"), TextChange::insert(1, "B")])
            .unwrap();
        assert_eq!(doc.text(), "abBc");
    }

    #[test]
    fn apply_changes_rejects_overlap() {
        let mut doc = Document::from_text("abcdef");
        let err = doc
            .apply_changes(&[TextChange::new(0, 3, ""), TextChange::new(2, 4, "")])
            .unwrap_err();
        assert!(matches!(err, CoreError::OverlappingChanges(2)));
        assert_eq!(doc.text(), "abcdef");
    }

    #[test]
    fn apply_changes_rejects_out_of_bounds() {
        let mut doc = Document::from_text("abc");
        let err = doc.apply_changes(&[TextChange::new(1, 9, "")]).unwrap_err();
        assert!(matches!(err, CoreError::OutOfBounds { offset: 9, len: 3 }));
    }

    #[test]
    fn set_text_replaces_content() {
        let mut doc = Document::from_text("old");
        doc.set_text("new text");
        assert_eq!(doc.text(), "new text");
        assert_eq!(doc.len_chars(), 8);
        assert!(!doc.is_empty());
    }
}
