//! Display sinks and generation events.
//!
//! A sink receives the cumulative cleaned text of the current round after
//! every fragment. Hosts that want round-level progress also implement
//! [`DisplaySink::on_event`].

use longform_core::provider::Usage;
use serde::{Deserialize, Serialize};

use crate::session::RoundSignal;

/// Events emitted by the generator around rounds.
///
/// - `round_started`: a round is about to call the provider
/// - `retrying`: an attempt failed and will be retried
/// - `round_finished`: a round's text was appended to the transcript
/// - `finished`: the session ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    RoundStarted {
        round: u32,
        prompt_chars: usize,
    },

    Retrying {
        round: u32,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    RoundFinished {
        round: u32,
        signal: RoundSignal,
        chars: usize,
    },

    Finished {
        session_id: String,
        termination: String,
        rounds_used: u32,
        usage: Usage,
    },
}

impl GenerationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "round_started",
            Self::Retrying { .. } => "retrying",
            Self::RoundFinished { .. } => "round_finished",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Receives progressively displayed text.
///
/// `on_fragment` gets the whole cleaned text of the current round so far,
/// which may end in a partial word.
pub trait DisplaySink: Send {
    fn on_fragment(&mut self, round_text: &str);

    fn on_event(&mut self, _event: &GenerationEvent) {}
}

impl<F> DisplaySink for F
where
    F: FnMut(&str) + Send,
{
    fn on_fragment(&mut self, round_text: &str) {
        self(round_text)
    }
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn on_fragment(&mut self, _round_text: &str) {}
}
