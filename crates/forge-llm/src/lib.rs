//! # Forge LLM
//!
//! The single gateway for language-model calls made by pipeline stages.
//!
//! ## Guarantees
//!
//! - At most `max_concurrent` calls in flight, starts spaced by `min_delay`
//! - Transient failures (rate limit, timeout, network, 5xx) retried with
//!   bounded exponential backoff; a provider `Retry-After` hint wins
//! - Authentication and unknown-model errors surface immediately
//! - Every wait observes the run's cancellation token
//!
//! ## Usage
//!
//! ```ignore
//! let provider = Arc::new(OpenAiCompatProvider::from_env()?);
//! let client = LlmClient::new(provider);
//! let reply = client.complete(&CompletionRequest::new("hello"), &cancel).await?;
//! ```

#![warn(missing_debug_implementations)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod json;
pub mod provider;
pub mod providers;
pub mod rate_limit;
pub mod retry;
pub mod testing;

pub use client::{LlmClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{LlmError, Result};
pub use json::extract_json;
pub use provider::{CompletionRequest, LlmProvider};
pub use providers::{OpenAiCompatProvider, ProviderConfig, ProviderKind};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use testing::ScriptedProvider;
