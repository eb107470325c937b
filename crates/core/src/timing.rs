//! Speaking-rate heuristic used to estimate turn durations.

/// Average conversational speaking rate.
pub const DEFAULT_WORDS_PER_MINUTE: f64 = 150.0;

/// Floor for any non-empty utterance, in seconds.
const MIN_DURATION_SECONDS: f64 = 0.5;

/// Estimate how long `text` takes to speak at `words_per_minute`.
///
/// Empty or whitespace-only text is zero seconds; anything else is strictly
/// positive, even for a non-positive rate.
pub fn estimate_duration_seconds(text: &str, words_per_minute: f64) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    if !(words_per_minute.is_finite() && words_per_minute > 0.0) {
        return MIN_DURATION_SECONDS;
    }

    (words as f64 / words_per_minute * 60.0).max(MIN_DURATION_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(estimate_duration_seconds("", DEFAULT_WORDS_PER_MINUTE), 0.0);
        assert_eq!(estimate_duration_seconds("   \n", DEFAULT_WORDS_PER_MINUTE), 0.0);
    }

    #[test]
    fn test_single_word_gets_floor() {
        assert_eq!(estimate_duration_seconds("Hi", DEFAULT_WORDS_PER_MINUTE), 0.5);
    }

    #[test]
    fn test_scales_with_word_count() {
        let text = vec!["word"; 150].join(" ");
        let secs = estimate_duration_seconds(&text, DEFAULT_WORDS_PER_MINUTE);
        assert!((secs - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_rate_still_positive() {
        assert!(estimate_duration_seconds("hello there", 0.0) > 0.0);
        assert!(estimate_duration_seconds("hello there", f64::NAN) > 0.0);
    }
}
