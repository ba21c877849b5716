//! Provider router — selects the correct LLM provider based on config.
//!
//! Handles provider creation and routing requests to the right backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use longform_core::provider::Provider;
use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
    read_timeout: Duration,
}

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Per-read timeout for providers this router creates.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a provider by name, or an ad-hoc endpoint given as
    /// `custom:https://host/v1`.
    ///
    /// Built-in providers that were not configured are created on demand
    /// with `api_key`.
    pub fn resolve(&self, name: &str, api_key: &str) -> Option<Arc<dyn Provider>> {
        if let Some(base_url) = name.strip_prefix("custom:") {
            return Some(Arc::new(
                OpenAiCompatProvider::new("custom", base_url, api_key)
                    .with_read_timeout(self.read_timeout),
            ));
        }
        self.get(name).or_else(|| {
            BUILTIN_PROVIDERS
                .contains(&name)
                .then(|| build_provider(name, None, api_key, self.read_timeout))
        })
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn build_provider(
    name: &str,
    base_url: Option<&str>,
    api_key: &str,
    read_timeout: Duration,
) -> Arc<dyn Provider> {
    if name == "anthropic" {
        // Use native Anthropic provider for direct API access
        let mut p = AnthropicProvider::new(api_key).with_read_timeout(read_timeout);
        if let Some(url) = base_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let url = base_url
            .map(str::to_string)
            .unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, url, api_key).with_read_timeout(read_timeout))
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &longform_config::AppConfig) -> ProviderRouter {
    // Same bound the generator applies to each fragment wait.
    let read_timeout = Duration::from_secs(config.retry.request_timeout_secs.max(1));
    let mut router =
        ProviderRouter::new(&config.default_provider).with_read_timeout(read_timeout);

    for (name, provider_config) in &config.providers {
        let api_key = config.api_key_for(name).unwrap_or_default();
        let provider = build_provider(
            name,
            provider_config.api_url.as_deref(),
            &api_key,
            read_timeout,
        );
        router.register(name.clone(), provider);
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key_for(&config.default_provider).unwrap_or_default();
        let provider = build_provider(&config.default_provider, None, &api_key, read_timeout);
        router.register(config.default_provider.clone(), provider);
    }

    router
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "mistral" => "https://api.mistral.ai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

/// Well-known provider names with a built-in base URL.
pub const BUILTIN_PROVIDERS: &[&str] = &[
    "openai",
    "openrouter",
    "anthropic",
    "ollama",
    "groq",
    "deepseek",
    "together",
    "fireworks",
    "mistral",
    "vllm",
    "llamacpp",
];

#[cfg(test)]
mod tests {
    use super::*;
    use longform_config::{AppConfig, ProviderConfig};

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openrouter");
        let provider = Arc::new(OpenAiCompatProvider::openrouter("sk-test"));
        router.register("openrouter", provider);

        assert!(router.get("openrouter").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn build_from_default_config_registers_default() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn anthropic_gets_native_provider() {
        let mut config = AppConfig::default();
        config.default_provider = "anthropic".into();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("sk-ant".into()),
                api_url: None,
                default_model: None,
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.default().unwrap().name(), "anthropic");
    }

    #[test]
    fn configured_providers_are_listed() {
        let mut config = AppConfig::default();
        for name in ["groq", "ollama"] {
            config.providers.insert(
                name.into(),
                ProviderConfig {
                    api_key: None,
                    api_url: None,
                    default_model: None,
                },
            );
        }
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["groq", "ollama", "openai"]);
    }

    #[test]
    fn resolve_custom_endpoint() {
        let router = ProviderRouter::new("openai");
        let provider = router.resolve("custom:http://localhost:9000/v1", "").unwrap();
        assert_eq!(provider.name(), "custom");
        assert!(router.resolve("missing", "").is_none());
    }

    #[test]
    fn resolve_builds_unconfigured_builtin() {
        let router = ProviderRouter::new("openai");
        assert_eq!(router.resolve("groq", "gsk").unwrap().name(), "groq");
        assert_eq!(router.resolve("anthropic", "sk-ant").unwrap().name(), "anthropic");
    }

    #[test]
    fn read_timeout_follows_retry_config() {
        let mut config = AppConfig::default();
        config.retry.request_timeout_secs = 600;
        let router = build_from_config(&config);
        assert_eq!(router.read_timeout, Duration::from_secs(600));
        assert_eq!(ProviderRouter::new("openai").read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn known_base_urls() {
        assert!(default_base_url("groq").contains("groq.com"));
        assert!(default_base_url("ollama").contains("11434"));
        assert!(default_base_url("acme").contains("acme"));
    }
}
