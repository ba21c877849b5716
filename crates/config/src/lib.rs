//! Configuration loading, validation, and management for Longform.
//!
//! Loads configuration from `~/.longform/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.longform/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response (one round)
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Continuation loop budget
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Artifact naming and persistence
    #[serde(default)]
    pub artifact: ArtifactConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// API keys found in the environment, keyed by variable name
    #[serde(skip)]
    env_keys: HashMap<&'static str, String>,

    /// The environment variable `api_key` was taken from, if any
    #[serde(skip)]
    api_key_var: Option<&'static str>,
}

/// Environment variables searched for an API key, highest priority first.
pub const API_KEY_VARS: &[&str] = &[
    "LONGFORM_API_KEY",
    "OPENROUTER_API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
];

/// The environment variable that holds `provider`'s own API key.
pub fn provider_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        _ => None,
    }
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    3500
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("generation", &self.generation)
            .field("retry", &self.retry)
            .field("artifact", &self.artifact)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Budget for one generation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum characters of transcript sent per request
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,

    /// Maximum number of rounds per session
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Appended to the prompt when asking the model to resume
    #[serde(default = "default_continuation_cue")]
    pub continuation_cue: String,

    /// Emitted by the model when the output is finished
    #[serde(default = "default_completion_sentinel")]
    pub completion_sentinel: String,

    /// Per-model window overrides (model name → characters)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub model_windows: HashMap<String, usize>,
}

fn default_window_chars() -> usize {
    3500
}
fn default_max_rounds() -> u32 {
    10
}
fn default_continuation_cue() -> String {
    "[Instruction: continue output]".into()
}
fn default_completion_sentinel() -> String {
    "[Instruction: output complete]".into()
}

impl GenerationConfig {
    /// Window size for a model, falling back to `window_chars`.
    pub fn window_for(&self, model: &str) -> usize {
        self.model_windows
            .get(model)
            .copied()
            .unwrap_or(self.window_chars)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            max_rounds: default_max_rounds(),
            continuation_cue: default_continuation_cue(),
            completion_sentinel: default_completion_sentinel(),
            model_windows: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per round, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry of a transient failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap for exponential backoff
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Minimum backoff after a rate-limit response
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Bound on opening a stream and on each wait for the next fragment
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_rate_limit_delay_ms() -> u64 {
    10_000
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Fixed UTC offset used for the filename timestamp
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Prepend the seed text to the saved artifact
    #[serde(default)]
    pub include_seed: bool,

    /// Directory artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_utc_offset_hours() -> i32 {
    9
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            include_seed: false,
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.longform/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `LONGFORM_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    /// - `ANTHROPIC_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path, |var| std::env::var(var).ok())
    }

    /// Load `path`, apply overrides read through `lookup`, then validate.
    pub fn load_with_env(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for &var in API_KEY_VARS {
            if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
                self.env_keys.insert(var, key);
            }
        }

        // LONGFORM_API_KEY beats the file; the provider-named keys only fill a gap.
        let chain = if self.api_key.is_none() {
            API_KEY_VARS
        } else {
            &API_KEY_VARS[..1]
        };
        if let Some(&var) = chain.iter().find(|v| self.env_keys.contains_key(*v)) {
            self.api_key = self.env_keys.get(var).cloned();
            self.api_key_var = Some(var);
        }

        if let Some(provider) = lookup("LONGFORM_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("LONGFORM_MODEL") {
            self.default_model = model;
        }
    }

    /// The API key to send to `provider`.
    ///
    /// Order: the provider's own `api_key`, `LONGFORM_API_KEY`, the
    /// provider's named variable (e.g. `ANTHROPIC_API_KEY`), then the
    /// top-level `api_key`. A top-level key that came from another
    /// provider's variable is never used.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        let own_var = provider_key_var(provider);
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.env_keys.get("LONGFORM_API_KEY").cloned())
            .or_else(|| own_var.and_then(|var| self.env_keys.get(var).cloned()))
            .or_else(|| match self.api_key_var {
                Some(var) if var != "LONGFORM_API_KEY" && Some(var) != own_var => None,
                _ => self.api_key.clone(),
            })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".longform")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.default_provider.trim().is_empty() || self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_provider and default_model must not be empty".into(),
            ));
        }

        let generation = &self.generation;
        if generation.window_chars == 0 || generation.model_windows.values().any(|w| *w == 0) {
            return Err(ConfigError::ValidationError(
                "generation window sizes must be > 0".into(),
            ));
        }
        if generation.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_rounds must be > 0".into(),
            ));
        }
        if generation.continuation_cue.is_empty() || generation.completion_sentinel.is_empty() {
            return Err(ConfigError::ValidationError(
                "continuation_cue and completion_sentinel must not be empty".into(),
            ));
        }
        if generation.continuation_cue.contains(&generation.completion_sentinel)
            || generation.completion_sentinel.contains(&generation.continuation_cue)
        {
            return Err(ConfigError::ValidationError(
                "continuation_cue and completion_sentinel must differ and not contain each other"
                    .into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be > 0".into(),
            ));
        }
        if self.retry.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry.request_timeout_secs must be > 0".into(),
            ));
        }

        if !(-14..=14).contains(&self.artifact.utc_offset_hours) {
            return Err(ConfigError::ValidationError(
                "artifact.utc_offset_hours must be between -14 and 14".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
            artifact: ArtifactConfig::default(),
            providers: HashMap::new(),
            env_keys: HashMap::new(),
            api_key_var: None,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
