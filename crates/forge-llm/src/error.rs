//! Error types for forge-llm

use std::time::Duration;
use thiserror::Error;

/// LLM error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Credential rejected by the provider
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit {
        /// Provider hint for when to try again
        retry_after: Option<Duration>,
    },

    /// Requested model does not exist
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status not covered above
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The run was cancelled while waiting or retrying
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether another attempt may succeed.
    ///
    /// Rate limits, timeouts, network faults and server-side (5xx) errors
    /// are retried. Authentication and missing-model errors fail immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, LlmError>;
