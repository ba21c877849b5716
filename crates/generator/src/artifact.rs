//! Named text artifacts built from a finished generation.
//!
//! Only the name and content are produced here. Persisting them is the
//! host's job.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::generator::Generation;

const FALLBACK_STEM: &str = "longform";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub content: String,
}

impl Artifact {
    /// Build the artifact for `generation`.
    ///
    /// The filename is `<topic>_<YYYYMMDDHHMMSS>.md`, with the timestamp
    /// rendered at `utc_offset_hours`. With `include_seed` the content is the
    /// full exchange, otherwise the generated text only.
    pub fn from_generation(
        generation: &Generation,
        topic: &str,
        utc_offset_hours: i32,
        include_seed: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let content = if include_seed {
            generation.full_exchange()
        } else {
            generation.artifact()
        };
        Self::new(topic, content, utc_offset_hours, now)
    }

    pub fn new(
        topic: &str,
        content: impl Into<String>,
        utc_offset_hours: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename_for(topic, utc_offset_hours, now),
            content: content.into(),
        }
    }
}

/// `<sanitized topic>_<YYYYMMDDHHMMSS>.md`
pub fn filename_for(topic: &str, utc_offset_hours: i32, now: DateTime<Utc>) -> String {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    let stamp = now.with_timezone(&offset).format("%Y%m%d%H%M%S");
    format!("{}_{stamp}.md", sanitize_stem(topic))
}

/// Make `topic` safe to use as a file name on common filesystems.
pub fn sanitize_stem(topic: &str) -> String {
    let mapped: String = topic
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .take(64)
        .collect();
    let stem = mapped.trim_matches(|c| c == '.' || c == '_');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 20, 30, 5).unwrap()
    }

    #[test]
    fn filename_uses_offset_timestamp() {
        // 20:30:05 UTC is 05:30:05 the next day at +9
        assert_eq!(
            filename_for("LearnMate", 9, instant()),
            "LearnMate_20240302053005.md"
        );
        assert_eq!(filename_for("LearnMate", 0, instant()), "LearnMate_20240301203005.md");
        assert_eq!(filename_for("x", -5, instant()), "x_20240301153005.md");
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(filename_for("x", 99, instant()), "x_20240301203005.md");
    }

    #[test]
    fn sanitizes_topic() {
        assert_eq!(sanitize_stem("Rust: traits / generics"), "Rust__traits___generics");
        assert_eq!(sanitize_stem("  ../etc  "), "etc");
        assert_eq!(sanitize_stem("量子力学"), "量子力学");
        assert_eq!(sanitize_stem("???"), FALLBACK_STEM);
        assert_eq!(sanitize_stem(""), FALLBACK_STEM);
    }

    #[test]
    fn long_topics_are_capped() {
        let topic = "a".repeat(200);
        assert_eq!(sanitize_stem(&topic).chars().count(), 64);
    }
}
