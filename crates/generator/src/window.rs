//! Sliding-window prompt construction.
//!
//! The outbound prompt is the joined transcript cut to its trailing
//! `window_chars` characters. Older context is dropped, never the most
//! recent text. The continuation cue is appended after the cut, so it is
//! never the thing that gets truncated.

use crate::budget::SessionBudget;

/// The trailing `max_chars` characters of `text`.
///
/// Counts Unicode scalar values, so multi-byte text is never split inside a
/// character.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

/// Build the user content for `round` (1-based) from the transcript.
pub fn build_prompt(segments: &[String], budget: &SessionBudget, round: u32) -> String {
    let joined = segments.concat();
    let mut prompt = tail_chars(&joined, budget.window_chars()).to_string();
    if round > 1 {
        prompt.push_str(budget.continuation_cue());
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(window: usize) -> SessionBudget {
        SessionBudget::new(window, 10, "[CONTINUE]", "[DONE]").unwrap()
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("", 10), "");
    }

    #[test]
    fn keeps_trailing_characters() {
        assert_eq!(tail_chars("0123456789ABCDE", 10), "56789ABCDE");
        assert_eq!(tail_chars("0123456789", 10), "0123456789");
    }

    #[test]
    fn counts_characters_not_bytes() {
        // Five three-byte characters
        assert_eq!(tail_chars("続きを出力", 2), "出力");
    }

    #[test]
    fn first_round_has_no_cue() {
        let segments = vec!["Rust ownership".to_string()];
        assert_eq!(build_prompt(&segments, &budget(100), 1), "Rust ownership");
    }

    #[test]
    fn window_applies_before_cue() {
        let segments = vec!["0123456789ABCDE".to_string()];
        let prompt = build_prompt(&segments, &budget(10), 2);
        assert_eq!(prompt, "56789ABCDE[CONTINUE]");
    }

    #[test]
    fn window_spans_segment_boundaries() {
        let segments = vec!["topic".to_string(), "first part ".into(), "second".into()];
        let prompt = build_prompt(&segments, &budget(8), 3);
        assert_eq!(prompt, "t second[CONTINUE]");
    }

    #[test]
    fn joined_without_separator() {
        let segments = vec!["Hello ".to_string(), "wor".into()];
        assert_eq!(build_prompt(&segments, &budget(100), 1), "Hello wor");
    }
}
