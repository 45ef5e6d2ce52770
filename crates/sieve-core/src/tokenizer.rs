use regex::Regex;
use std::sync::LazyLock;

use crate::constants::MAX_INPUT_BYTES;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s']").unwrap());
static APOSTROPHE_TRIM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'+|'+$").unwrap());

/// Cut `text` to at most `MAX_INPUT_BYTES`, backing off to the nearest char boundary.
fn cap_input(text: &str) -> &str {
    if text.len() <= MAX_INPUT_BYTES {
        return text;
    }
    let mut end = MAX_INPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Normalize and segment message text into lowercase words.
///
/// Punctuation becomes whitespace, apostrophes inside words survive
/// ("don't"), digits are kept, and nothing is stemmed. Only the first
/// `MAX_INPUT_BYTES` of the input are considered.
pub fn split_words(text: &str) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(cap_input(text), " ");
    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(|t| APOSTROPHE_TRIM.replace_all(t, "").to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
