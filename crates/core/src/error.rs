//! Error types for the Longform domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Longform operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, timeouts, dropped connections and server-side (5xx)
    /// failures are transient. Anything that says the request itself is
    /// wrong is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_)
            | ProviderError::StreamInterrupted(_) => true,
            ProviderError::ApiError { status_code, .. } => {
                matches!(status_code, 408 | 409 | 425 | 429 | 500..=599)
            }
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }

    /// Whether this is a rate-limit class failure.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::ApiError { status_code: 429, .. }
        )
    }

    /// Provider-supplied retry hint, in seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Map an HTTP error status and body to the matching variant.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => ProviderError::AuthenticationFailed(message),
            404 => ProviderError::ModelNotFound(message),
            400 | 413 | 422 => ProviderError::InvalidRequest(message),
            408 => ProviderError::Timeout(message),
            _ => ProviderError::ApiError {
                status_code,
                message,
            },
        }
    }
}

/// Session-level failures of the continuation-bounded generator.
///
/// Partial success (round budget exhausted, caller cancellation) is not an
/// error; see `Termination` in the generator crate.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Provider unavailable in round {round} after {attempts} attempt(s): {source}")]
    ProviderUnavailable {
        round: u32,
        attempts: u32,
        source: ProviderError,
    },

    #[error("Provider rejected the request in round {round}: {source}")]
    InvalidRequest { round: u32, source: ProviderError },

    #[error("Provider refused or filtered the output in round {round}")]
    ContentRejected { round: u32 },

    #[error("Unrecognized stop reason '{reason}' in round {round}")]
    UnrecognizedStopReason { round: u32, reason: String },

    #[error("Invalid session budget: {0}")]
    InvalidBudget(String),
}

impl GenerationError {
    /// The round in which the failure happened, if it happened in one.
    pub fn round(&self) -> Option<u32> {
        match self {
            GenerationError::ProviderUnavailable { round, .. }
            | GenerationError::InvalidRequest { round, .. }
            | GenerationError::ContentRejected { round }
            | GenerationError::UnrecognizedStopReason { round, .. } => Some(*round),
            GenerationError::InvalidBudget(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "Service Unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(ProviderError::Timeout("slow".into()).is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::StreamInterrupted("eof".into()).is_transient());
        assert!(ProviderError::ApiError {
            status_code: 502,
            message: "bad gateway".into()
        }
        .is_transient());

        assert!(!ProviderError::InvalidRequest("bad args".into()).is_transient());
        assert!(!ProviderError::AuthenticationFailed("key".into()).is_transient());
        assert!(!ProviderError::ApiError {
            status_code: 418,
            message: "teapot".into()
        }
        .is_transient());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(401, "nope"),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ProviderError::from_status(422, "bad"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(408, "slow"),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "boom"),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn rate_limit_hint() {
        let err = ProviderError::RateLimited { retry_after_secs: 30 };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after_secs(), Some(30));
        assert_eq!(ProviderError::Network("x".into()).retry_after_secs(), None);
    }

    #[test]
    fn generation_error_carries_round() {
        let err = GenerationError::UnrecognizedStopReason {
            round: 2,
            reason: "tool_calls".into(),
        };
        assert_eq!(err.round(), Some(2));
        assert!(err.to_string().contains("tool_calls"));

        let err = GenerationError::ProviderUnavailable {
            round: 1,
            attempts: 3,
            source: ProviderError::Network("down".into()),
        };
        assert!(err.to_string().contains("3 attempt"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
