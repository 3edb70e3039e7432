//! Shared fixtures for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_llm::{CompletionRequest, LlmClient, LlmError, LlmProvider, RateLimiter, RetryPolicy};
use forge_runtime::{ForgeConfig, PipelineRuntime, ServiceContainer};
use parking_lot::Mutex;

/// A short field report with a recognisable header.
pub const REPORT: &str = "SECRET // NOFORN\n\
REPORT ID: SR-2026-0113\n\
DATE: 2026-01-13\n\
PREPARED BY: 3rd Recon Battalion\n\
Alice Smith, an analyst with ACME Corp, was seen leaving the ACME Corp office in Berlin.";

pub const ENTITIES_REPLY: &str = r#"```json
[
  {"type": "person", "text": "Alice Smith", "attributes": {"role": "analyst"}},
  {"type": "ORGANIZATION", "text": "ACME Corp", "attributes": {}},
  {"type": "LOCATION", "text": " Berlin ", "attributes": "n/a"}
]
```"#;

pub const RELATIONS_REPLY: &str = r#"[
  {"source": "Alice Smith", "target": "ACME Corp", "relation_type": "WORKS_FOR", "confidence": 0.9},
  {"source": "ACME Corp", "target": "Berlin", "relation_type": "LOCATED_IN", "confidence": 0.8},
  {"source": "Alice Smith", "target": "Paris", "relation_type": "VISITED", "confidence": 0.5}
]"#;

pub const PROFILE_REPLY: &str =
    r#"{"summary": "Known figure in the report.", "key_attributes": ["seen in Berlin"], "importance": 0.7}"#;

pub const NARRATIVE_REPLY: &str = "Alice Smith works for ACME Corp, which operates in Berlin.";

/// Which stage a prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Extraction,
    Resolution,
    Profile,
    Duplicate,
    Narrative,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Self {
        if prompt.starts_with("You are an information extraction system") {
            Self::Extraction
        } else if prompt.starts_with("You are analysing an intelligence document") {
            Self::Resolution
        } else if prompt.starts_with("Write an intelligence profile") {
            Self::Profile
        } else if prompt.starts_with("Do these two") {
            Self::Duplicate
        } else {
            Self::Narrative
        }
    }
}

/// Answers each prompt with the canned reply for the stage that sent it.
///
/// Prompts of kinds listed in `failing` get an API error instead.
#[derive(Debug, Default)]
pub struct RoutedProvider {
    calls: AtomicUsize,
    seen: Mutex<Vec<(PromptKind, String)>>,
    failing: Vec<PromptKind>,
    latency: Duration,
}

impl RoutedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(kinds: Vec<PromptKind>) -> Self {
        Self {
            failing: kinds,
            ..Self::default()
        }
    }

    /// Time spent on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.seen.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn prompts_of(&self, kind: PromptKind) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for RoutedProvider {
    fn name(&self) -> &str {
        "routed"
    }

    fn default_model(&self) -> &str {
        "routed-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> forge_llm::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = PromptKind::of(&request.prompt);
        self.seen.lock().push((kind, request.prompt.clone()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing.contains(&kind) {
            return Err(LlmError::Api {
                status: 400,
                message: "rejected".to_string(),
            });
        }
        let reply = match kind {
            PromptKind::Extraction => ENTITIES_REPLY,
            PromptKind::Resolution => RELATIONS_REPLY,
            PromptKind::Profile => PROFILE_REPLY,
            PromptKind::Duplicate => "NO",
            PromptKind::Narrative => NARRATIVE_REPLY,
        };
        Ok(reply.to_string())
    }
}

/// Client with no pacing and no retries.
pub fn fast_client(provider: Arc<dyn LlmProvider>) -> LlmClient {
    LlmClient::new(provider)
        .with_limiter(Arc::new(RateLimiter::unlimited()))
        .with_retry(RetryPolicy::none())
}

/// One call at a time, like a rate-limited provider.
pub fn serial_client(provider: Arc<dyn LlmProvider>) -> LlmClient {
    LlmClient::new(provider)
        .with_limiter(Arc::new(RateLimiter::new(1, Duration::ZERO)))
        .with_retry(RetryPolicy::none())
}

/// Defaults with the profiler pause removed and a short drain timeout.
pub fn test_config() -> ForgeConfig {
    let mut config = ForgeConfig::default();
    config.processing.profiler_delay = 0.0;
    config.runtime.idle_timeout_secs = 10;
    config
}

/// A started runtime.
pub async fn started_runtime(config: ForgeConfig, llm: Option<LlmClient>) -> PipelineRuntime {
    let container = ServiceContainer::new(config, llm).expect("inside a tokio runtime");
    let runtime = PipelineRuntime::new(container);
    runtime.start().await.expect("stages start");
    runtime
}
