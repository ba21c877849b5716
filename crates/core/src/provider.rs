//! Provider trait — the abstraction over chat-completion backends.
//!
//! A Provider knows how to send a system directive plus user content to an
//! LLM and get a response back, either as a complete message or as a stream
//! of fragments that ends with a stop reason.
//!
//! Implementations: OpenAI-compatible, Anthropic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A streamed request with a fixed system directive and one user turn.
    pub fn instruction(
        model: impl Into<String>,
        system_directive: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                Message::system(system_directive),
                Message::user(user_content),
            ],
            temperature: default_temperature(),
            max_tokens: None,
            stream: true,
            stop: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The content of the last user message, if any.
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Why a provider stopped generating.
///
/// Providers spell these differently (`length` vs `max_tokens`, `stop` vs
/// `end_turn`); [`StopReason::parse`] folds them into one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Output was cut off by the token limit.
    Length,
    /// The model finished on its own.
    Stop,
    /// The provider refused or filtered the output.
    Error,
    /// A reason this crate does not know.
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "length" | "max_tokens" | "model_length" => StopReason::Length,
            "stop" | "end_turn" | "stop_sequence" | "eos" => StopReason::Stop,
            "content_filter" | "refusal" | "error" | "safety" => StopReason::Error,
            _ => StopReason::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::Length => "length",
            StopReason::Stop => "stop",
            StopReason::Error => "error",
            StopReason::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Why generation stopped, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<StopReason>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Add another usage report to this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Stop reason, set on (or after) the last content chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<StopReason>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A content-only chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only a stop reason.
    pub fn finished(reason: StopReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }

    /// The terminal chunk.
    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

/// Receiving half of a streamed response.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The generator calls `stream()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single content chunk followed by the terminal chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                finish_reason: response.finish_reason,
                done: false,
                usage: response.usage,
            }))
            .await;
        let _ = tx.send(Ok(StreamChunk::done())).await;
        Ok(rx)
    }

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn instruction_request_shape() {
        let req = ProviderRequest::instruction("gpt-4o", "You are a tutor", "Rust traits");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert!(req.stream);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.user_content(), Some("Rust traits"));
    }

    #[test]
    fn stop_reason_parsing() {
        assert_eq!(StopReason::parse("length"), StopReason::Length);
        assert_eq!(StopReason::parse("max_tokens"), StopReason::Length);
        assert_eq!(StopReason::parse("stop"), StopReason::Stop);
        assert_eq!(StopReason::parse("end_turn"), StopReason::Stop);
        assert_eq!(StopReason::parse("content_filter"), StopReason::Error);
        assert_eq!(
            StopReason::parse("tool_calls"),
            StopReason::Other("tool_calls".into())
        );
    }

    #[test]
    fn stop_reason_display_keeps_raw_value() {
        assert_eq!(StopReason::Other("pause_turn".into()).to_string(), "pause_turn");
        assert_eq!(StopReason::Length.to_string(), "length");
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.accumulate(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.accumulate(&Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        });
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.prompt_tokens, 11);
    }

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(request.user_content().unwrap_or_default()),
                finish_reason: Some(StopReason::Stop),
                usage: None,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let mut rx = EchoProvider
            .stream(ProviderRequest::instruction("m", "sys", "hello"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("hello"));
        assert_eq!(first.finish_reason, Some(StopReason::Stop));

        let last = rx.recv().await.unwrap().unwrap();
        assert!(last.done);
        assert!(rx.recv().await.is_none());
    }
}
