//! Completion results in editor terms, and the prefix filter that narrows
//! them to the token being typed.
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{CompletionItem, CompletionItemKind};

/// A completion request from the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Cursor offset in chars.
    pub offset: usize,
    /// The user asked for completion, as opposed to typing.
    pub explicit: bool,
}

impl CompletionRequest {
    pub fn explicit(offset: usize) -> Self {
        Self {
            offset,
            explicit: true,
        }
    }

    pub fn typed(offset: usize) -> Self {
        Self {
            offset,
            explicit: false,
        }
    }
}

/// A completion candidate with its defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOption {
    pub label: String,
    /// Text inserted when the option is accepted.
    pub apply: String,
    pub detail: Option<String>,
    pub kind: Option<CompletionItemKind>,
    pub sort_text: String,
    pub filter_text: String,
}

impl From<CompletionItem> for CompletionOption {
    fn from(item: CompletionItem) -> Self {
        let apply = item
            .text_edit
            .map(|edit| edit.new_text)
            .or(item.insert_text)
            .unwrap_or_else(|| item.label.clone());
        Self {
            sort_text: item.sort_text.unwrap_or_else(|| item.label.clone()),
            filter_text: item.filter_text.unwrap_or_else(|| item.label.clone()),
            apply,
            detail: item.detail,
            kind: item.kind,
            label: item.label,
        }
    }
}

/// Filtered options and where they apply.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    /// Start of the replaced token, in chars.
    pub from: usize,
    pub options: Vec<CompletionOption>,
    /// Matches text that these options remain valid for while typing.
    pub valid_for: Option<Regex>,
}

impl CompletionResult {
    /// Whether the result can be reused for `token` without a new request.
    pub fn is_valid_for(&self, token: &str) -> bool {
        self.valid_for.as_ref().is_some_and(|re| re.is_match(token))
    }
}

fn word_char_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"^\w$").expect("word regex is valid"))
}

fn word_suffix_regex() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"\w+$").expect("suffix regex is valid"))
}

pub fn is_word_char(ch: char) -> bool {
    let mut buf = [0u8; 4];
    word_char_regex().is_match(ch.encode_utf8(&mut buf))
}

/// Whether `text` ends in a word.
pub fn ends_with_word(text: &str) -> bool {
    word_suffix_regex().is_match(text)
}

/// Render a set of chars as the inside of a regex class. Word chars
/// collapse into a single `\w`.
fn char_class(chars: &[char]) -> String {
    let mut class = String::new();
    if chars.iter().any(|&c| is_word_char(c)) {
        class.push_str(r"\w");
    }
    let mut buf = [0u8; 4];
    for &c in chars.iter().filter(|&&c| !is_word_char(c)) {
        class.push_str(&regex::escape(c.encode_utf8(&mut buf)));
    }
    class
}

/// Regexes describing the tokens the options could complete: anchored for
/// `valid_for` and unanchored for finding the token before the cursor.
pub fn prefix_patterns(options: &[CompletionOption]) -> Option<(Regex, Regex)> {
    let mut first: Vec<char> = Vec::new();
    let mut rest: Vec<char> = Vec::new();
    for option in options {
        let mut chars = option.apply.chars();
        if let Some(c) = chars.next() {
            if !first.contains(&c) {
                first.push(c);
            }
        }
        for c in chars {
            if !rest.contains(&c) {
                rest.push(c);
            }
        }
    }
    if first.is_empty() {
        return None;
    }
    let source = if rest.is_empty() {
        format!("[{}]", char_class(&first))
    } else {
        format!("[{}][{}]*", char_class(&first), char_class(&rest))
    };
    let anchored = Regex::new(&format!("^{source}$")).ok()?;
    let unanchored = Regex::new(&format!("{source}$")).ok()?;
    Some((anchored, unanchored))
}

/// Narrow `options` to the token ending at `cursor`.
///
/// `line_before` is the cursor line's text up to the cursor. Without a
/// token every option is kept and the result starts at the cursor.
pub fn filter_by_prefix(
    options: Vec<CompletionOption>,
    line_before: &str,
    cursor: usize,
) -> CompletionResult {
    let Some((anchored, unanchored)) = prefix_patterns(&options) else {
        return CompletionResult {
            from: cursor,
            options,
            valid_for: None,
        };
    };
    let Some(token) = unanchored.find(line_before).map(|m| m.as_str()) else {
        return CompletionResult {
            from: cursor,
            options,
            valid_for: Some(anchored),
        };
    };

    let lowered = token.to_lowercase();
    let mut kept: Vec<CompletionOption> = options
        .into_iter()
        .filter(|option| option.filter_text.to_lowercase().starts_with(&lowered))
        .collect();
    kept.sort_by_key(|option| !option.apply.starts_with(token));

    CompletionResult {
        from: cursor.saturating_sub(token.chars().count()),
        options: kept,
        valid_for: Some(anchored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompletionTextEdit;

    fn option(apply: &str) -> CompletionOption {
        CompletionOption {
            label: apply.to_string(),
            apply: apply.to_string(),
            detail: None,
            kind: None,
            sort_text: apply.to_string(),
            filter_text: apply.to_string(),
        }
    }

    fn applies(result: &CompletionResult) -> Vec<&str> {
        result.options.iter().map(|o| o.apply.as_str()).collect()
    }

    #[test]
    fn option_defaults_follow_item_fields() {
        let item = CompletionItem {
            label: "printf".into(),
            kind: Some(CompletionItemKind::Function),
            detail: Some("int printf(const char *, ...)".into()),
            insert_text: Some("printf(".into()),
            text_edit: None,
            sort_text: None,
            filter_text: None,
        };
        let option = CompletionOption::from(item.clone());
        assert_eq!(option.apply, "printf(");
        assert_eq!(option.sort_text, "printf");
        assert_eq!(option.filter_text, "printf");

        let with_edit = CompletionItem {
            text_edit: Some(CompletionTextEdit {
                new_text: "printf".into(),
            }),
            filter_text: Some("print".into()),
            ..item
        };
        let option = CompletionOption::from(with_edit);
        assert_eq!(option.apply, "printf");
        assert_eq!(option.filter_text, "print");
    }

    #[test]
    fn label_is_the_last_resort() {
        let item = CompletionItem {
            label: "x".into(),
            kind: None,
            detail: None,
            insert_text: None,
            text_edit: None,
            sort_text: None,
            filter_text: None,
        };
        assert_eq!(CompletionOption::from(item).apply, "x");
    }

    #[test]
    fn filters_to_typed_prefix() {
        let options = vec![option("foo"), option("foobar"), option("baz")];
        let result = filter_by_prefix(options, "  fo", 4);
        assert_eq!(result.from, 2);
        assert_eq!(applies(&result), ["foo", "foobar"]);
        assert!(result.is_valid_for("foob"));
        assert!(!result.is_valid_for("foo bar"));
    }

    #[test]
    fn exact_case_matches_come_first() {
        let options = vec![option("Foo"), option("FOOD"), option("foo"), option("fob")];
        let result = filter_by_prefix(options, "fo", 2);
        assert_eq!(applies(&result), ["foo", "fob", "Foo", "FOOD"]);
    }

    #[test]
    fn no_token_keeps_everything_at_cursor() {
        let options = vec![option("foo"), option("bar")];
        let result = filter_by_prefix(options, "x = ", 4);
        assert_eq!(result.from, 4);
        assert_eq!(result.options.len(), 2);
    }

    #[test]
    fn no_options_means_no_filter() {
        let result = filter_by_prefix(Vec::new(), "fo", 2);
        assert!(result.options.is_empty());
        assert!(result.valid_for.is_none());
        assert_eq!(result.from, 2);
    }

    #[test]
    fn punctuation_is_escaped_in_classes() {
        let options = vec![option("->next"), option("-[x]")];
        let (anchored, unanchored) = prefix_patterns(&options).unwrap();
        assert!(anchored.is_match("->ne"));
        assert!(anchored.is_match("-[x]"));
        assert!(!anchored.is_match("+"));
        assert_eq!(unanchored.find("p->ne").unwrap().as_str(), "->ne");
    }

    #[test]
    fn word_chars_collapse() {
        assert_eq!(char_class(&['a', 'b', '_', '1']), r"\w");
        assert_eq!(char_class(&['a', '.']), r"\w\.");
        assert!(is_word_char('é'));
        assert!(!is_word_char('.'));
    }

    #[test]
    fn single_char_options() {
        let options = vec![option("a"), option("b")];
        let (anchored, _) = prefix_patterns(&options).unwrap();
        assert!(anchored.is_match("a"));
        assert!(!anchored.is_match("ab"));
    }

    #[test]
    fn word_suffix_detection() {
        assert!(ends_with_word("int x"));
        assert!(!ends_with_word("x = "));
        assert!(!ends_with_word(""));
    }
}
