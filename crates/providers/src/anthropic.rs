//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Streaming via SSE `content_block_delta` events, with the stop reason
//!   taken from `message_delta`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use longform_core::error::ProviderError;
use longform_core::message::{Message, Role};
use longform_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::sse::{SseLine, SseLineBuffer};
use crate::status::{check_status, transport_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(DEFAULT_READ_TIMEOUT),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url
            .into()
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
        self
    }

    /// Replace the idle timeout for each socket read.
    ///
    /// A stream may run for as long as data keeps arriving within this bound.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Extract system messages from the message list.
    /// Anthropic puts the system prompt in a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let rest = messages.iter().filter(|m| m.role != Role::System).collect();

        if system.is_empty() {
            (None, rest)
        } else {
            (Some(system.join("\n\n")), rest)
        }
    }

    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str().into(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(request.stop);
        }

        body
    }

    fn post(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
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
impl longform_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self.post(&body).send().await.map_err(transport_error)?;
        let response = check_status(&self.name, response).await?;

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(api_resp.into_provider_response())
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request, true);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .post(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(&self.name, response).await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut state = StreamState::default();

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
                    if !forward_line(&mut state, line, &tx).await {
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if !forward_line(&mut state, line, &tx).await {
                    return;
                }
            }

            // Stream ended without message_stop, send the final chunk
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        // Anthropic doesn't have a models listing endpoint; return known models
        Ok(vec![
            "claude-sonnet-4-20250514".into(),
            "claude-opus-4-20250514".into(),
            "claude-3-5-haiku-20241022".into(),
            "claude-3-5-sonnet-20241022".into(),
        ])
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        // Try a minimal request to verify API key
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });

        let response = self.post(&body).send().await.map_err(transport_error)?;

        // 200 = works, 401 = bad key, anything else = reachable but error
        Ok(response.status().is_success() || response.status().as_u16() != 401)
    }
}

/// Usage is split across `message_start` (input) and `message_delta` (output).
#[derive(Debug, Default)]
struct StreamState {
    input_tokens: u32,
}

/// Outcome of one SSE `data:` payload.
#[derive(Debug)]
enum SseEvent {
    Chunk(StreamChunk),
    Done,
    Skip,
    Failed(ProviderError),
}

async fn forward_line(
    state: &mut StreamState,
    line: SseLine,
    tx: &mpsc::Sender<std::result::Result<StreamChunk, ProviderError>>,
) -> bool {
    let data = match line {
        SseLine::Data(data) if !data.is_empty() => data,
        // Anthropic repeats the event type inside the data payload
        _ => return true,
    };

    match parse_sse_data(state, &data) {
        SseEvent::Chunk(chunk) => tx.send(Ok(chunk)).await.is_ok(),
        SseEvent::Done => {
            let _ = tx.send(Ok(StreamChunk::done())).await;
            false
        }
        SseEvent::Skip => true,
        SseEvent::Failed(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn parse_sse_data(state: &mut StreamState, data: &str) -> SseEvent {
    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
            return SseEvent::Skip;
        }
    };

    match event["type"].as_str().unwrap_or("") {
        "message_start" => {
            if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                state.input_tokens = input as u32;
            }
            SseEvent::Skip
        }
        "content_block_delta" => {
            let delta = &event["delta"];
            match (delta["type"].as_str(), delta["text"].as_str()) {
                (Some("text_delta"), Some(text)) if !text.is_empty() => {
                    SseEvent::Chunk(StreamChunk::text(text))
                }
                _ => SseEvent::Skip,
            }
        }
        "message_delta" => {
            let finish_reason = event["delta"]["stop_reason"].as_str().map(StopReason::parse);
            let usage = event["usage"]["output_tokens"].as_u64().map(|out| {
                let out = out as u32;
                Usage {
                    prompt_tokens: state.input_tokens,
                    completion_tokens: out,
                    total_tokens: state.input_tokens.saturating_add(out),
                }
            });

            if finish_reason.is_none() && usage.is_none() {
                SseEvent::Skip
            } else {
                SseEvent::Chunk(StreamChunk {
                    finish_reason,
                    usage,
                    ..StreamChunk::default()
                })
            }
        }
        "message_stop" => SseEvent::Done,
        "error" => {
            let message = event["error"]["message"]
                .as_str()
                .unwrap_or("unknown stream error")
                .to_string();
            match event["error"]["type"].as_str() {
                Some("invalid_request_error") => {
                    SseEvent::Failed(ProviderError::InvalidRequest(message))
                }
                _ => SseEvent::Failed(ProviderError::StreamInterrupted(message)),
            }
        }
        _ => SseEvent::Skip,
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl AnthropicResponse {
    fn into_provider_response(self) -> ProviderResponse {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Other => None,
            })
            .collect();

        ProviderResponse {
            message: Message::assistant(text.join("\n")),
            finish_reason: self.stop_reason.as_deref().map(StopReason::parse),
            usage: Some(Usage {
                prompt_tokens: self.usage.input_tokens,
                completion_tokens: self.usage.output_tokens,
                total_tokens: self.usage.input_tokens + self.usage.output_tokens,
            }),
            model: self.model,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
