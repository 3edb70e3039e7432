//! # LLM Client
//!
//! Wraps a provider with the process-wide rate limiter, a per-request
//! timeout and bounded retry. All stage LLM traffic goes through here.

use crate::error::{LlmError, Result};
use crate::json::extract_json;
use crate::provider::{CompletionRequest, LlmProvider};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use forge_telemetry::{HistogramTimer, LLM_REQUESTS, LLM_REQUEST_DURATION, LLM_RETRIES};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared LLM client. Cheap to clone.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.default_model())
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a client with default limits (one call at a time, 2s apart).
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            limiter: Arc::new(RateLimiter::default()),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Share an existing limiter (so several clients respect one budget).
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Complete a prompt, retrying transient failures.
    ///
    /// Returns `LlmError::Cancelled` as soon as `cancel` fires, including
    /// while waiting on the limiter or sleeping between attempts.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(LlmError::Cancelled),
                result = self.attempt(request) => result,
            };

            match outcome {
                Ok(text) => {
                    LLM_REQUESTS.with_label_values(&["success"]).inc();
                    return Ok(text);
                }
                Err(LlmError::Cancelled) => {
                    LLM_REQUESTS.with_label_values(&["cancelled"]).inc();
                    return Err(LlmError::Cancelled);
                }
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let delay = self.retry.delay_for(attempt, &e);
                    LLM_RETRIES.inc();
                    info!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            LLM_REQUESTS.with_label_values(&["cancelled"]).inc();
                            return Err(LlmError::Cancelled);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    LLM_REQUESTS.with_label_values(&["failure"]).inc();
                    warn!(
                        provider = self.provider.name(),
                        attempts = attempt + 1,
                        error = %e,
                        "LLM call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Complete a prompt and parse the JSON payload of the reply.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let reply = self.complete(request, cancel).await?;
        let json = extract_json(&reply)
            .ok_or_else(|| LlmError::InvalidResponse("no JSON found in reply".to_string()))?;
        serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String> {
        let _permit = self.limiter.acquire().await?;
        let _timer = HistogramTimer::new(&LLM_REQUEST_DURATION);

        debug!(
            provider = self.provider.name(),
            model = request.model.as_deref().unwrap_or(self.provider.default_model()),
            max_tokens = request.max_tokens,
            "LLM request"
        );

        match tokio::time::timeout(self.request_timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }
}
