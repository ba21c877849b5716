//! Session state owned by the caller.
//!
//! A `Session` is created per user request and handed to the generator by
//! `&mut`. Nothing here is shared between sessions.

use chrono::{DateTime, Utc};
use longform_core::provider::{StopReason, Usage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a generation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered text segments of a session. Segment 0 is the seed.
///
/// Append-only: segments are never edited or removed once pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    segments: Vec<String>,
}

impl Transcript {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            segments: vec![seed.into()],
        }
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn seed(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Generated segments, without the seed.
    pub fn generated(&self) -> &[String] {
        self.segments.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total length in characters.
    pub fn char_count(&self) -> usize {
        self.segments.iter().map(|s| s.chars().count()).sum()
    }
}

/// Signal a round ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundSignal {
    Continue,
    Complete,
}

/// Record of one finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub index: u32,
    /// Length of the outbound prompt, in characters
    pub prompt_chars: usize,
    /// Cleaned inbound text
    pub text: String,
    /// Stop reason the provider reported, if any
    pub stop_reason: Option<StopReason>,
    pub signal: RoundSignal,
    /// Provider attempts used, including the successful one
    pub attempts: u32,
}

/// One end-to-end generation for a single user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Label used for the artifact filename
    pub topic: String,
    pub transcript: Transcript,
    pub rounds: Vec<RoundRecord>,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(topic: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            topic: topic.into(),
            transcript: Transcript::new(seed),
            rounds: Vec::new(),
            usage: Usage::default(),
            created_at: Utc::now(),
        }
    }

    /// Start over with a new seed, keeping the id and topic.
    pub fn reset(&mut self, seed: impl Into<String>) {
        self.transcript = Transcript::new(seed);
        self.rounds.clear();
        self.usage = Usage::default();
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Generated text so far, without the seed.
    pub fn artifact_text(&self) -> String {
        self.transcript.generated().concat()
    }

    /// Seed followed by the generated text.
    pub fn full_text(&self) -> String {
        self.transcript.segments().concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(SessionId::from("abc").to_string(), "abc");
    }

    #[test]
    fn transcript_starts_with_seed() {
        let mut t = Transcript::new("Rust");
        assert_eq!(t.seed(), "Rust");
        assert!(t.generated().is_empty());
        t.push("Part one. ");
        t.push("Part two.");
        assert_eq!(t.len(), 3);
        assert_eq!(t.generated(), ["Part one. ", "Part two."]);
        assert_eq!(t.char_count(), 4 + 10 + 9);
    }

    #[test]
    fn artifact_excludes_seed() {
        let mut session = Session::new("rust", "Rust ownership");
        session.transcript.push("Hello ");
        session.transcript.push("world.");
        assert_eq!(session.artifact_text(), "Hello world.");
        assert_eq!(session.full_text(), "Rust ownershipHello world.");
    }

    #[test]
    fn reset_clears_previous_rounds() {
        let mut session = Session::new("rust", "first");
        session.transcript.push("text");
        session.rounds.push(RoundRecord {
            index: 1,
            prompt_chars: 5,
            text: "text".into(),
            stop_reason: Some(StopReason::Stop),
            signal: RoundSignal::Complete,
            attempts: 1,
        });
        let id = session.id.clone();

        session.reset("second");
        assert_eq!(session.id, id);
        assert_eq!(session.transcript.segments(), ["second"]);
        assert_eq!(session.rounds_completed(), 0);
    }

    #[test]
    fn round_signal_serializes_snake_case() {
        let json = serde_json::to_string(&RoundSignal::Complete).unwrap();
        assert_eq!(json, r#""complete""#);
    }
}
