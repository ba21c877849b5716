//! The continuation-bounded round loop.
//!
//! Each round sends the windowed transcript to the provider, streams the
//! reply into the display sink, and decides from the completion sentinel and
//! the stop reason whether another round is needed.

use std::sync::Arc;

use longform_config::AppConfig;
use longform_core::error::{GenerationError, ProviderError};
use longform_core::provider::{Provider, ProviderRequest, StopReason, Usage};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::SessionBudget;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sentinel::SentinelFilter;
use crate::session::{RoundRecord, RoundSignal, Session, SessionId};
use crate::sink::{DisplaySink, GenerationEvent};
use crate::window::build_prompt;

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model signalled completion.
    Complete,
    /// The round cap was reached while the model still wanted to continue.
    TruncatedOutput,
    /// The caller cancelled the session.
    Cancelled,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Complete => "complete",
            Termination::TruncatedOutput => "truncated_output",
            Termination::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a session that did not fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub session_id: SessionId,
    pub termination: Termination,
    pub rounds_used: u32,
    pub usage: Usage,
    seed: String,
    segments: Vec<String>,
}

impl Generation {
    fn from_session(session: &Session, termination: Termination) -> Self {
        Self {
            session_id: session.id.clone(),
            termination,
            rounds_used: session.rounds_completed(),
            usage: session.usage,
            seed: session.transcript.seed().to_string(),
            segments: session.transcript.generated().to_vec(),
        }
    }

    /// Generated text in round order, without the seed.
    pub fn artifact(&self) -> String {
        self.segments.concat()
    }

    /// The seed followed by the generated text.
    pub fn full_exchange(&self) -> String {
        let mut out = self.seed.clone();
        for segment in &self.segments {
            out.push_str(segment);
        }
        out
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Complete
    }
}

/// A failed session together with what it produced before failing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error} (after {rounds_completed} completed round(s))")]
pub struct GenerationFailure {
    #[source]
    pub error: GenerationError,
    /// Generated text of the rounds that completed, without the seed
    pub partial_artifact: String,
    pub rounds_completed: u32,
}

enum RoundOutcome {
    Finished {
        text: String,
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
        attempts: u32,
    },
    Cancelled {
        text: String,
    },
}

enum StreamOutcome {
    Finished {
        text: String,
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },
    Cancelled {
        text: String,
    },
}

/// Drives a session round by round against one provider.
pub struct ContinuationGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    budget: SessionBudget,
    retry: RetryPolicy,
}

impl ContinuationGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, budget: SessionBudget) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            budget,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a generator for `model` from the application config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        config: &AppConfig,
    ) -> Result<Self, GenerationError> {
        let model = model.into();
        let budget = SessionBudget::from_config(&config.generation, &model)?;
        Ok(Self::new(provider, model, budget)
            .with_temperature(config.default_temperature)
            .with_max_tokens(Some(config.default_max_tokens))
            .with_retry(RetryPolicy::from_config(&config.retry)))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-response token cap.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budget(mut self, budget: SessionBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> &SessionBudget {
        &self.budget
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run rounds until completion, the round cap, cancellation or failure.
    ///
    /// `instructions` is sent as the system message of every round. The
    /// session's transcript is extended in place, so after a failure or a
    /// cancellation it still holds everything accumulated so far.
    pub async fn run(
        &self,
        session: &mut Session,
        instructions: &str,
        sink: &mut dyn DisplaySink,
        cancel: Option<&CancellationToken>,
    ) -> Result<Generation, GenerationFailure> {
        let cancel = cancel.cloned().unwrap_or_else(CancellationToken::new);
        let filter = SentinelFilter::from_budget(&self.budget);
        let max_rounds = self.budget.max_rounds();

        info!(
            session = %session.id,
            provider = self.provider.name(),
            model = %self.model,
            max_rounds,
            window_chars = self.budget.window_chars(),
            "Starting generation"
        );

        let mut termination = Termination::TruncatedOutput;
        while session.rounds_completed() < max_rounds {
            if cancel.is_cancelled() {
                termination = Termination::Cancelled;
                break;
            }

            let round = session.rounds_completed() + 1;
            let prompt = build_prompt(session.transcript.segments(), &self.budget, round);
            let prompt_chars = prompt.chars().count();
            debug!(session = %session.id, round, prompt_chars, "Sending round");
            sink.on_event(&GenerationEvent::RoundStarted {
                round,
                prompt_chars,
            });

            let outcome = match self
                .run_round(round, instructions, &prompt, &filter, sink, &cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => return Err(failure(session, error)),
            };

            let (text, stop_reason, usage, attempts) = match outcome {
                RoundOutcome::Finished {
                    text,
                    stop_reason,
                    usage,
                    attempts,
                } => (text, stop_reason, usage, attempts),
                RoundOutcome::Cancelled { text } => {
                    let partial = filter.strip(&text);
                    if !partial.is_empty() {
                        session.transcript.push(partial);
                    }
                    info!(session = %session.id, round, "Generation cancelled");
                    termination = Termination::Cancelled;
                    break;
                }
            };

            let signal = match classify(&filter, &text, stop_reason.as_ref(), round) {
                Ok(signal) => signal,
                Err(error) => return Err(failure(session, error)),
            };

            let cleaned = filter.strip(&text);
            sink.on_fragment(&cleaned);
            if let Some(usage) = usage {
                session.usage.accumulate(&usage);
            }

            let chars = cleaned.chars().count();
            session.transcript.push(cleaned.clone());
            session.rounds.push(RoundRecord {
                index: round,
                prompt_chars,
                text: cleaned,
                stop_reason: stop_reason.clone(),
                signal,
                attempts,
            });
            sink.on_event(&GenerationEvent::RoundFinished {
                round,
                signal,
                chars,
            });
            info!(
                session = %session.id,
                round,
                chars,
                attempts,
                stop_reason = stop_reason.as_ref().map(StopReason::as_str).unwrap_or("none"),
                signal = ?signal,
                "Round finished"
            );

            if signal == RoundSignal::Complete {
                termination = Termination::Complete;
                break;
            }
        }

        let generation = Generation::from_session(session, termination);
        info!(
            session = %session.id,
            termination = %generation.termination,
            rounds_used = generation.rounds_used,
            total_tokens = generation.usage.total_tokens,
            transcript_chars = session.transcript.char_count(),
            "Generation finished"
        );
        sink.on_event(&GenerationEvent::Finished {
            session_id: generation.session_id.to_string(),
            termination: generation.termination.as_str().to_string(),
            rounds_used: generation.rounds_used,
            usage: generation.usage,
        });
        Ok(generation)
    }

    /// One round, retried per the retry policy.
    async fn run_round(
        &self,
        round: u32,
        instructions: &str,
        prompt: &str,
        filter: &SentinelFilter,
        sink: &mut dyn DisplaySink,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome, GenerationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Ok(RoundOutcome::Cancelled {
                    text: String::new(),
                });
            }

            let request = ProviderRequest::instruction(&self.model, instructions, prompt)
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens);

            let error = match self.stream_attempt(request, filter, sink, cancel).await {
                Ok(StreamOutcome::Finished {
                    text,
                    stop_reason,
                    usage,
                }) => {
                    return Ok(RoundOutcome::Finished {
                        text,
                        stop_reason,
                        usage,
                        attempts: attempt,
                    });
                }
                Ok(StreamOutcome::Cancelled { text }) => {
                    return Ok(RoundOutcome::Cancelled { text });
                }
                Err(error) => error,
            };

            match self.retry.decide(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    let delay_ms = delay.as_millis() as u64;
                    warn!(
                        provider = self.provider.name(),
                        round,
                        attempt,
                        delay_ms,
                        error = %error,
                        "Provider attempt failed, retrying"
                    );
                    sink.on_event(&GenerationEvent::Retrying {
                        round,
                        attempt,
                        delay_ms,
                        error: error.to_string(),
                    });
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Ok(RoundOutcome::Cancelled { text: String::new() });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted => {
                    warn!(
                        provider = self.provider.name(),
                        round,
                        attempts = attempt,
                        error = %error,
                        "Provider attempts exhausted"
                    );
                    return Err(GenerationError::ProviderUnavailable {
                        round,
                        attempts: attempt,
                        source: error,
                    });
                }
                RetryDecision::Fatal => {
                    warn!(
                        provider = self.provider.name(),
                        round,
                        error = %error,
                        "Provider rejected the request"
                    );
                    return Err(GenerationError::InvalidRequest {
                        round,
                        source: error,
                    });
                }
            }
        }
    }

    /// Open the stream and consume it to its end.
    async fn stream_attempt(
        &self,
        request: ProviderRequest,
        filter: &SentinelFilter,
        sink: &mut dyn DisplaySink,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, ProviderError> {
        let limit = self.retry.request_timeout;

        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(StreamOutcome::Cancelled { text: String::new() });
            }
            opened = timeout(limit, self.provider.stream(request)) => match opened {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "stream not opened within {}s",
                        limit.as_secs()
                    )));
                }
            },
        };

        let mut text = String::new();
        let mut stop_reason = None;
        let mut usage = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled { text }),
                next = timeout(limit, rx.recv()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => break,
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "no fragment within {}s",
                        limit.as_secs()
                    )));
                }
            };

            if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
                text.push_str(content);
                sink.on_fragment(&filter.display(&text));
            }
            if chunk.finish_reason.is_some() {
                stop_reason = chunk.finish_reason;
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        Ok(StreamOutcome::Finished {
            text,
            stop_reason,
            usage,
        })
    }
}

/// Decide whether a round's text ends the session.
fn classify(
    filter: &SentinelFilter,
    text: &str,
    stop_reason: Option<&StopReason>,
    round: u32,
) -> Result<RoundSignal, GenerationError> {
    if filter.signals_completion(text) {
        return Ok(RoundSignal::Complete);
    }
    match stop_reason {
        None | Some(StopReason::Length) => Ok(RoundSignal::Continue),
        Some(StopReason::Stop) => Ok(RoundSignal::Complete),
        Some(StopReason::Error) => Err(GenerationError::ContentRejected { round }),
        Some(StopReason::Other(reason)) => Err(GenerationError::UnrecognizedStopReason {
            round,
            reason: reason.clone(),
        }),
    }
}

fn failure(session: &Session, error: GenerationError) -> GenerationFailure {
    warn!(session = %session.id, error = %error, "Generation failed");
    GenerationFailure {
        error,
        partial_artifact: session.artifact_text(),
        rounds_completed: session.rounds_completed(),
    }
}
