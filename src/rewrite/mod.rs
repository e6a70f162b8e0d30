mod chat;

pub use chat::ChatRewriter;

use anyhow::Result;
use regex::Regex;
use similar::{ChangeTag, TextDiff};
use std::future::Future;
use std::sync::LazyLock;

static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```$").expect("valid code fence regex")
});

/// Turns captured text into its corrected form.
pub trait Rewriter {
    fn rewrite(&self, text: &str) -> impl Future<Output = Result<String>>;
}

/// Strips wrapping the model sometimes adds around its answer: surrounding
/// whitespace, a markdown code fence, or a pair of quotes the original text
/// did not have.
pub fn clean_rewrite(original: &str, rewritten: &str) -> String {
    let mut cleaned = rewritten.trim();

    if let Some(captures) = CODE_FENCE_REGEX.captures(cleaned) {
        if let Some(inner) = captures.get(1) {
            cleaned = inner.as_str().trim();
        }
    }

    let original = original.trim();
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')] {
        let wrapped = cleaned.len() >= 2 && cleaned.starts_with(open) && cleaned.ends_with(close);
        let original_wrapped = original.starts_with(open) && original.ends_with(close);
        if wrapped && !original_wrapped {
            cleaned = cleaned[open.len_utf8()..cleaned.len() - close.len_utf8()].trim();
            break;
        }
    }

    cleaned.to_string()
}

/// Number of inserted or deleted words between two texts.
pub fn count_word_changes(before: &str, after: &str) -> usize {
    TextDiff::from_words(before, after)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .filter(|change| !change.value().trim().is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_the_original_did_not_have() {
        assert_eq!(clean_rewrite("its fine", "\"It's fine.\""), "It's fine.");
        assert_eq!(
            clean_rewrite("\"quoted\" text", "\"Quoted\" text."),
            "\"Quoted\" text."
        );
    }

    #[test]
    fn unwraps_code_fences() {
        let rewritten = "```text\nThis is fixed.\n```";
        assert_eq!(clean_rewrite("this is fixd", rewritten), "This is fixed.");
    }

    #[test]
    fn keeps_plain_answers() {
        assert_eq!(clean_rewrite("helo", "  Hello.\n"), "Hello.");
    }

    #[test]
    fn counts_changed_words() {
        assert_eq!(count_word_changes("same text", "same text"), 0);
        assert_eq!(
            count_word_changes("their going home", "they're going home"),
            2
        );
    }
}
