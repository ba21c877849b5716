//! Scripted providers and recording sinks for generator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use longform_core::error::ProviderError;
use longform_core::message::Role;
use longform_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StopReason, StreamChunk, Usage,
};
use tokio::sync::mpsc;

use crate::budget::SessionBudget;
use crate::generator::ContinuationGenerator;
use crate::retry::RetryPolicy;
use crate::sink::{DisplaySink, GenerationEvent};

/// One scripted provider attempt.
pub enum Step {
    /// Stream these fragments, then the stop reason with usage, then done.
    Stream(Vec<String>, Option<StopReason>),
    /// Fail to open the stream.
    Fail(ProviderError),
    /// Stream these fragments, then fail.
    BreakAfter(Vec<String>, ProviderError),
    /// Open the stream and never send anything.
    Hang,
}

impl Step {
    pub fn stream(fragments: &[&str], stop: Option<StopReason>) -> Self {
        Step::Stream(fragments.iter().map(|f| f.to_string()).collect(), stop)
    }

    pub fn fail(error: ProviderError) -> Self {
        Step::Fail(error)
    }

    pub fn break_after(fragments: &[&str], error: ProviderError) -> Self {
        Step::BreakAfter(fragments.iter().map(|f| f.to_string()).collect(), error)
    }
}

pub const ROUND_USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

/// Plays back one [`Step`] per `stream()` call and records every request.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
    hung: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            hung: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User content of every request, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.user_content().unwrap_or_default().to_string())
            .collect()
    }

    pub fn system_directives(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.messages.iter().find(|m| m.role == Role::System))
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("scripted provider only streams".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let (tx, rx) = mpsc::channel(64);
        match step {
            Step::Stream(fragments, stop) => {
                for fragment in fragments {
                    let _ = tx.try_send(Ok(StreamChunk::text(fragment)));
                }
                if let Some(reason) = stop {
                    let mut chunk = StreamChunk::finished(reason);
                    chunk.usage = Some(ROUND_USAGE);
                    let _ = tx.try_send(Ok(chunk));
                }
                let _ = tx.try_send(Ok(StreamChunk::done()));
            }
            Step::Fail(error) => return Err(error),
            Step::BreakAfter(fragments, error) => {
                for fragment in fragments {
                    let _ = tx.try_send(Ok(StreamChunk::text(fragment)));
                }
                let _ = tx.try_send(Err(error));
            }
            Step::Hang => self.hung.lock().unwrap().push(tx),
        }
        Ok(rx)
    }
}

/// Records fragments and event types.
#[derive(Default)]
pub struct RecordingSink {
    pub fragments: Vec<String>,
    pub events: Vec<GenerationEvent>,
}

impl RecordingSink {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(GenerationEvent::event_type).collect()
    }
}

impl DisplaySink for RecordingSink {
    fn on_fragment(&mut self, round_text: &str) {
        self.fragments.push(round_text.to_string());
    }

    fn on_event(&mut self, event: &GenerationEvent) {
        self.events.push(event.clone());
    }
}

/// A generator over `provider` with `[CONTINUE]` / `[DONE]` control tokens.
pub fn generator(
    provider: Arc<ScriptedProvider>,
    max_rounds: u32,
    window_chars: usize,
) -> ContinuationGenerator {
    let budget = SessionBudget::new(window_chars, max_rounds, "[CONTINUE]", "[DONE]").unwrap();
    ContinuationGenerator::new(provider, "test-model", budget).with_retry(RetryPolicy::default())
}
