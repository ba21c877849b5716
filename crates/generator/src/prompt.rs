//! Instruction templates for learning material.

use std::fmt::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::budget::SessionBudget;

/// Requests at or below this many characters get an overview, not a course.
pub const OVERVIEW_MAX_CHARS: usize = 300;

/// Audience level of the material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    fn audience(&self) -> &'static str {
        match self {
            Level::Beginner => "beginners",
            Level::Intermediate => "intermediate learners",
            Level::Advanced => "advanced practitioners",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" | "novice" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" | "expert" => Ok(Level::Advanced),
            other => Err(format!(
                "unknown level '{other}' (expected beginner, intermediate or advanced)"
            )),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of document the request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// A short overview a newcomer can skim.
    Overview,
    /// Training material with comprehension quizzes.
    Training,
}

/// A request for learning material on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequest {
    pub topic: String,
    #[serde(default)]
    pub level: Level,
    /// Target length in characters; 0 means no limit
    #[serde(default)]
    pub target_chars: usize,
}

impl MaterialRequest {
    pub fn new(topic: impl Into<String>, level: Level, target_chars: usize) -> Self {
        Self {
            topic: topic.into(),
            level,
            target_chars,
        }
    }

    pub fn kind(&self) -> MaterialKind {
        match self.target_chars {
            1..=OVERVIEW_MAX_CHARS => MaterialKind::Overview,
            _ => MaterialKind::Training,
        }
    }

    /// Seed text of the session: the topic itself.
    pub fn seed(&self) -> &str {
        &self.topic
    }

    /// The system directive for the whole session.
    pub fn instructions(&self, budget: &SessionBudget) -> String {
        let topic = self.topic.trim();
        let limit = match self.target_chars {
            0 => String::new(),
            n => format!(" in at most {n} characters"),
        };
        let goal = match self.kind() {
            MaterialKind::Overview => {
                format!("write a short overview of {topic} that a newcomer can skim{limit}")
            }
            MaterialKind::Training => format!(
                "write training material on {topic} that helps {} build real skill{limit}",
                self.level.audience()
            ),
        };

        let mut out = String::new();
        let _ = writeln!(out, "You are a veteran instructor in {topic}.");
        let _ = writeln!(out, "Your task: {goal}.");
        let _ = writeln!(out, "Follow these rules strictly:");
        let _ = writeln!(
            out,
            "- If a message ends with {cue}, continue the text that precedes {cue} exactly where it stopped, without repeating it.",
            cue = budget.continuation_cue()
        );
        let _ = writeln!(
            out,
            "- When the material is finished, end your output with {}.",
            budget.completion_sentinel()
        );
        let _ = writeln!(out, "- Consider several drafts step by step and output only the best one.");
        let _ = writeln!(out, "- Produce finished material, not a sample or an outline of one.");
        let _ = writeln!(out, "- Put any code or shell input in fenced code blocks.");
        let _ = writeln!(
            out,
            "- Write Markdown. Use HTML elements such as <details> and <summary> where they help."
        );
        let _ = writeln!(out, "- Cover each section in as much detail as you can.");
        if self.kind() == MaterialKind::Training {
            let _ = writeln!(
                out,
                "- Around the middle, add a short break with a piece of trivia about {topic}."
            );
            let _ = writeln!(
                out,
                "- End every section with a short quiz that checks understanding."
            );
        }
        let _ = writeln!(out, "- Cite a source for factual claims.");
        let _ = write!(
            out,
            "- Output only the material itself, with no comments about it."
        );
        out
    }
}
