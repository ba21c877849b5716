//! The immutable per-session budget.

use longform_config::GenerationConfig;
use longform_core::error::GenerationError;
use serde::{Deserialize, Serialize};

/// Limits and control tokens fixed before a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBudget {
    window_chars: usize,
    max_rounds: u32,
    continuation_cue: String,
    completion_sentinel: String,
}

impl SessionBudget {
    pub fn new(
        window_chars: usize,
        max_rounds: u32,
        continuation_cue: impl Into<String>,
        completion_sentinel: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let budget = Self {
            window_chars,
            max_rounds,
            continuation_cue: continuation_cue.into(),
            completion_sentinel: completion_sentinel.into(),
        };
        budget.validate()?;
        Ok(budget)
    }

    /// Build the budget for `model` from the `[generation]` config section.
    pub fn from_config(config: &GenerationConfig, model: &str) -> Result<Self, GenerationError> {
        Self::new(
            config.window_for(model),
            config.max_rounds,
            config.continuation_cue.clone(),
            config.completion_sentinel.clone(),
        )
    }

    fn validate(&self) -> Result<(), GenerationError> {
        if self.window_chars == 0 {
            return Err(GenerationError::InvalidBudget("window_chars must be > 0".into()));
        }
        if self.max_rounds == 0 {
            return Err(GenerationError::InvalidBudget("max_rounds must be > 0".into()));
        }
        if self.continuation_cue.is_empty() || self.completion_sentinel.is_empty() {
            return Err(GenerationError::InvalidBudget(
                "sentinels must not be empty".into(),
            ));
        }
        // One sentinel inside the other would make stripping ambiguous
        if self.continuation_cue.contains(&self.completion_sentinel)
            || self.completion_sentinel.contains(&self.continuation_cue)
        {
            return Err(GenerationError::InvalidBudget(
                "continuation cue and completion sentinel must not contain each other".into(),
            ));
        }
        Ok(())
    }

    pub fn window_chars(&self) -> usize {
        self.window_chars
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn continuation_cue(&self) -> &str {
        &self.continuation_cue
    }

    pub fn completion_sentinel(&self) -> &str {
        &self.completion_sentinel
    }

    /// Copy with a different round cap (for per-request overrides).
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Result<Self, GenerationError> {
        self.max_rounds = max_rounds;
        self.validate()?;
        Ok(self)
    }

    /// Copy with a different window (for per-request overrides).
    pub fn with_window_chars(mut self, window_chars: usize) -> Result<Self, GenerationError> {
        self.window_chars = window_chars;
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_budget() {
        let budget = SessionBudget::new(3500, 10, "[CONTINUE]", "[DONE]").unwrap();
        assert_eq!(budget.window_chars(), 3500);
        assert_eq!(budget.max_rounds(), 10);
        assert_eq!(budget.continuation_cue(), "[CONTINUE]");
        assert_eq!(budget.completion_sentinel(), "[DONE]");
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(SessionBudget::new(0, 10, "[C]", "[D]").is_err());
        assert!(SessionBudget::new(10, 0, "[C]", "[D]").is_err());
    }

    #[test]
    fn empty_or_overlapping_sentinels_rejected() {
        assert!(SessionBudget::new(10, 1, "", "[D]").is_err());
        assert!(SessionBudget::new(10, 1, "[END]", "END").is_err());
    }

    #[test]
    fn from_config_uses_model_window() {
        let mut config = GenerationConfig::default();
        config.model_windows.insert("gpt-4".into(), 6500);

        let budget = SessionBudget::from_config(&config, "gpt-4").unwrap();
        assert_eq!(budget.window_chars(), 6500);

        let budget = SessionBudget::from_config(&config, "gpt-3.5-turbo").unwrap();
        assert_eq!(budget.window_chars(), 3500);
        assert_eq!(budget.continuation_cue(), config.continuation_cue);
    }

    #[test]
    fn overrides_revalidate() {
        let budget = SessionBudget::new(100, 3, "[C]", "[D]").unwrap();
        assert_eq!(budget.clone().with_max_rounds(7).unwrap().max_rounds(), 7);
        assert!(budget.with_window_chars(0).is_err());
    }
}
