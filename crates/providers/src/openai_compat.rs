//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Groq, DeepSeek,
//! Together AI, Fireworks AI, and any OpenAI-compatible endpoint.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - `finish_reason` propagation on the final streamed choice
//! - Model listing and health checks

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use longform_core::error::ProviderError;
use longform_core::message::Message;
use longform_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::sse::{SseLine, SseLineBuffer};
use crate::status::{check_status, transport_error};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(DEFAULT_READ_TIMEOUT),
        }
    }

    /// Replace the idle timeout for each socket read.
    ///
    /// A stream may run for as long as data keeps arriving within this bound.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }
}

fn build_client(read_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl longform_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(&self.name, response).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let usage = api_response.usage.map(ApiUsage::into_usage);

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            finish_reason: choice.finish_reason.as_deref().map(StopReason::parse),
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(&self.name, response).await?;

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.feed(&bytes) {
                    if !forward_line(&provider_name, line, &tx).await {
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if !forward_line(&provider_name, line, &tx).await {
                    return;
                }
            }

            // Stream ended without [DONE], send the final chunk
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

/// What one SSE `data:` payload means for the consumer.
#[derive(Debug)]
enum SseEvent {
    Chunk(StreamChunk),
    Done,
    Skip,
    Failed(ProviderError),
}

/// Send the chunk for one SSE line. Returns `false` once the stream is over
/// or the receiver has gone away.
async fn forward_line(
    provider_name: &str,
    line: SseLine,
    tx: &mpsc::Sender<std::result::Result<StreamChunk, ProviderError>>,
) -> bool {
    let SseLine::Data(data) = line else {
        return true;
    };

    match parse_sse_data(&data) {
        SseEvent::Chunk(chunk) => tx.send(Ok(chunk)).await.is_ok(),
        SseEvent::Done => {
            let _ = tx.send(Ok(StreamChunk::done())).await;
            false
        }
        SseEvent::Skip => {
            trace!(provider = %provider_name, data = %data, "Ignoring SSE chunk");
            true
        }
        SseEvent::Failed(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn parse_sse_data(data: &str) -> SseEvent {
    // "[DONE]" signals end of stream
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let stream_resp = match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => resp,
        Err(_) => return SseEvent::Skip,
    };

    if let Some(error) = stream_resp.error {
        return SseEvent::Failed(ProviderError::StreamInterrupted(error.message));
    }

    let mut chunk = StreamChunk {
        usage: stream_resp.usage.map(ApiUsage::into_usage),
        ..StreamChunk::default()
    };

    if let Some(choice) = stream_resp.choices.into_iter().next() {
        chunk.content = choice.delta.content.filter(|c| !c.is_empty());
        chunk.finish_reason = choice.finish_reason.as_deref().map(StopReason::parse);
    }

    if chunk.content.is_none() && chunk.finish_reason.is_none() && chunk.usage.is_none() {
        SseEvent::Skip
    } else {
        SseEvent::Chunk(chunk)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use longform_core::Provider;

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "k");
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are a tutor"), Message::user("Rust")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let req = ProviderRequest::instruction("gpt-4o", "sys", "user").with_max_tokens(Some(3500));
        let body = OpenAiCompatProvider::request_body(&req, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 3500);
        assert!(body.get("stop").is_none());
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        match parse_sse_data(data) {
            SseEvent::Chunk(chunk) => {
                assert_eq!(chunk.content.as_deref(), Some("Hello"));
                assert!(chunk.finish_reason.is_none());
            }
            other => panic!("Expected chunk, got: {other:?}"),
        }
    }

    #[test]
    fn parse_stream_length_finish() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#;
        match parse_sse_data(data) {
            SseEvent::Chunk(chunk) => {
                assert!(chunk.content.is_none());
                assert_eq!(chunk.finish_reason, Some(StopReason::Length));
            }
            other => panic!("Expected chunk, got: {other:?}"),
        }
    }

    #[test]
    fn parse_stream_unknown_finish_kept_raw() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"function_call"}]}"#;
        match parse_sse_data(data) {
            SseEvent::Chunk(chunk) => assert_eq!(
                chunk.finish_reason,
                Some(StopReason::Other("function_call".into()))
            ),
            other => panic!("Expected chunk, got: {other:?}"),
        }
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        match parse_sse_data(data) {
            SseEvent::Chunk(chunk) => {
                let usage = chunk.usage.unwrap();
                assert_eq!(usage.prompt_tokens, 10);
                assert_eq!(usage.total_tokens, 15);
            }
            other => panic!("Expected chunk, got: {other:?}"),
        }
    }

    #[test]
    fn parse_empty_delta_is_skipped() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert!(matches!(parse_sse_data(data), SseEvent::Skip));
    }

    #[test]
    fn parse_done_sentinel() {
        assert!(matches!(parse_sse_data("[DONE]"), SseEvent::Done));
    }

    #[test]
    fn parse_garbage_is_skipped() {
        assert!(matches!(parse_sse_data("not json"), SseEvent::Skip));
    }

    #[test]
    fn parse_mid_stream_error() {
        let data = r#"{"error":{"message":"upstream overloaded","code":502}}"#;
        match parse_sse_data(data) {
            SseEvent::Failed(ProviderError::StreamInterrupted(msg)) => {
                assert!(msg.contains("overloaded"));
            }
            other => panic!("Expected failure, got: {other:?}"),
        }
    }

    #[test]
    fn parse_completion_response_with_finish_reason() {
        let data = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "Hi"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 4);
    }

    #[tokio::test]
    async fn forward_line_stops_on_done() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(!forward_line("test", SseLine::Data("[DONE]".into()), &tx).await);
        let chunk = rx.recv().await.unwrap().unwrap();
        assert!(chunk.done);
    }

    #[tokio::test]
    async fn forward_line_ignores_event_lines() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(forward_line("test", SseLine::Event("ping".into()), &tx).await);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
