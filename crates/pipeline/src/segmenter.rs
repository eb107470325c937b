//! Sentence segmentation
//!
//! Splits accumulated model text at `.`, `!` or `?` runs followed by
//! whitespace or end of input. Segmentation is a pure function of its input:
//! the shared matcher is compiled once and every call starts a fresh search.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence boundary pattern is valid"));

/// Split `text` into completed sentences and an unterminated remainder.
///
/// Sentences are trimmed and never empty. The remainder is returned as-is so
/// whitespace that may join a later token is not lost; trim it at flush time.
pub fn segment(text: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut consumed = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        let sentence = text[consumed..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        consumed = boundary.end();
    }

    (sentences, text[consumed..].to_string())
}
