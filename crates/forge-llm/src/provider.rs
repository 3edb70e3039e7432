//! Provider port.
//!
//! Stages never talk to an HTTP client directly; they go through
//! `LlmClient`, which wraps an `LlmProvider`.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single-prompt completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full prompt text (sent as one user message).
    pub prompt: String,
    /// Model override; the provider default is used when `None`.
    pub model: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a request with provider-default model.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: 1000,
            temperature: 0.3,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Driven port for text completion.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Perform one completion attempt. No retry happens here.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
