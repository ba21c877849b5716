//! Control-token handling for streamed text.
//!
//! The continuation cue and the completion sentinel are control tokens, not
//! content. They are stripped from the cumulative text of a round rather than
//! from individual fragments, because a sentinel may straddle fragment
//! boundaries.

use crate::budget::SessionBudget;

/// Strips and detects the two control tokens of a session.
#[derive(Debug, Clone)]
pub struct SentinelFilter {
    continuation_cue: String,
    completion_sentinel: String,
}

impl SentinelFilter {
    pub fn new(continuation_cue: impl Into<String>, completion_sentinel: impl Into<String>) -> Self {
        Self {
            continuation_cue: continuation_cue.into(),
            completion_sentinel: completion_sentinel.into(),
        }
    }

    pub fn from_budget(budget: &SessionBudget) -> Self {
        Self::new(budget.continuation_cue(), budget.completion_sentinel())
    }

    /// Remove every occurrence of both control tokens.
    ///
    /// Removal repeats until nothing matches, so text that only forms a
    /// sentinel after an inner one is removed is cleaned too. The result
    /// never contains either token, which makes `strip` idempotent.
    pub fn strip(&self, text: &str) -> String {
        remove_all(text, &[&self.continuation_cue, &self.completion_sentinel])
    }

    /// Whether the model reported completion in this round's text.
    ///
    /// Checked on the text with continuation cues removed, before the
    /// sentinel itself is stripped.
    pub fn signals_completion(&self, round_text: &str) -> bool {
        remove_all(round_text, &[&self.continuation_cue]).contains(&self.completion_sentinel)
    }

    /// Text safe to show while the round is still streaming.
    ///
    /// Like [`strip`](Self::strip), but also holds back a trailing fragment
    /// that could be the start of a control token still arriving.
    pub fn display(&self, round_text: &str) -> String {
        let mut cleaned = self.strip(round_text);
        let held = pending_prefix_len(&cleaned, &self.continuation_cue)
            .max(pending_prefix_len(&cleaned, &self.completion_sentinel));
        cleaned.truncate(cleaned.len() - held);
        cleaned
    }
}

fn remove_all(text: &str, tokens: &[&str]) -> String {
    let mut current = text.to_string();
    loop {
        let next = tokens
            .iter()
            .filter(|t| !t.is_empty())
            .fold(current.clone(), |acc, token| acc.replace(token, ""));
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Byte length of the longest proper prefix of `token` that `text` ends with.
fn pending_prefix_len(text: &str, token: &str) -> usize {
    token
        .char_indices()
        .skip(1)
        .map(|(len, _)| len)
        .filter(|len| text.ends_with(&token[..*len]))
        .max()
        .unwrap_or(0)
}
