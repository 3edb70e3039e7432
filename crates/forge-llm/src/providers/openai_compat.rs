//! OpenAI-compatible chat completion provider.
//!
//! OpenRouter, Cherry, LM Proxy and LM Studio all speak the same
//! `POST {base_url}/chat/completions` protocol; they differ only in base URL,
//! credential and default model.

use crate::error::{LlmError, Result};
use crate::provider::{CompletionRequest, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Placeholder credential for local providers that ignore auth.
const LOCAL_API_KEY: &str = "not-needed";

/// Application name sent to OpenRouter for attribution.
const APP_NAME: &str = "Forge";

/// Known OpenAI-compatible backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenRouter,
    Cherry,
    LmProxy,
    LmStudio,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenRouter,
        ProviderKind::Cherry,
        ProviderKind::LmProxy,
        ProviderKind::LmStudio,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::Cherry => "cherry",
            Self::LmProxy => "lm_proxy",
            Self::LmStudio => "lm_studio",
        }
    }

    /// Runs on the local machine and needs no real credential.
    #[must_use]
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::OpenRouter)
    }

    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Cherry => "http://localhost:8000/v1",
            Self::LmProxy => "http://localhost:4000/openai/v1",
            Self::LmStudio => "http://localhost:1234/v1",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Cherry => "CHERRY_API_KEY",
            Self::LmProxy => "LM_PROXY_API_KEY",
            Self::LmStudio => "LM_STUDIO_API_KEY",
        }
    }

    fn base_url_var(&self) -> &'static str {
        match self {
            Self::OpenRouter => "OPENROUTER_BASE_URL",
            Self::Cherry => "CHERRY_API_URL",
            Self::LmProxy => "LM_PROXY_BASE_URL",
            Self::LmStudio => "LM_STUDIO_BASE_URL",
        }
    }

    fn model_vars(&self) -> &'static [&'static str] {
        match self {
            Self::OpenRouter => &["OPENROUTER_MODEL", "OPENROUTER_DEFAULT_MODEL"],
            Self::Cherry => &["CHERRY_MODEL"],
            Self::LmProxy => &["LM_PROXY_MODEL"],
            Self::LmStudio => &["LM_STUDIO_MODEL"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| LlmError::NotConfigured(format!("unknown provider: {s}")))
    }
}

/// Resolved connection settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve settings from the process environment.
    ///
    /// `DEFAULT_PROVIDER` selects the backend (OpenRouter when unset).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = match get("DEFAULT_PROVIDER") {
            Some(name) => name.parse()?,
            None => ProviderKind::OpenRouter,
        };
        Self::for_kind(kind, get)
    }

    /// Resolve settings for a specific backend.
    pub fn for_kind<F>(kind: ProviderKind, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match lookup(kind.api_key_var()) {
            Some(key) => key,
            None if kind.is_local() => LOCAL_API_KEY.to_string(),
            None => return Err(LlmError::NotConfigured(kind.api_key_var().to_string())),
        };

        let base_url = lookup(kind.base_url_var())
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let model = kind
            .model_vars()
            .iter()
            .find_map(|var| lookup(*var))
            .ok_or_else(|| LlmError::NotConfigured(kind.model_vars()[0].to_string()))?;

        Ok(Self {
            kind,
            base_url,
            api_key,
            model,
            timeout: crate::client::DEFAULT_REQUEST_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP provider for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.config.kind.as_str()
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if self.config.kind == ProviderKind::OpenRouter {
            builder = builder.header("X-Title", APP_NAME);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                LlmError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text, model, retry_after));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        debug!(provider = self.name(), bytes = text.len(), "LLM response received");
        parse_completion(&text)
    }
}

/// Map a non-success HTTP status to a typed error.
fn classify_status(status: u16, body: &str, model: &str, retry_after: Option<Duration>) -> LlmError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        401 | 403 => LlmError::Authentication(message),
        404 => LlmError::ModelNotFound(model.to_string()),
        429 => LlmError::RateLimit { retry_after },
        _ => LlmError::Api { status, message },
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_provider_kind_parse_normalizes() {
        assert_eq!("LM-Studio".parse::<ProviderKind>().unwrap(), ProviderKind::LmStudio);
        assert_eq!(" openrouter ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert_eq!("lm_proxy".parse::<ProviderKind>().unwrap(), ProviderKind::LmProxy);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_defaults_to_openrouter() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_DEFAULT_MODEL", "mistral/small"),
        ]))
        .unwrap();
        assert_eq!(config.kind, ProviderKind::OpenRouter);
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.model, "mistral/small");
    }

    #[test]
    fn test_openrouter_requires_key() {
        let err = ProviderConfig::from_lookup(lookup(&[("OPENROUTER_MODEL", "m")])).unwrap_err();
        assert_eq!(err, LlmError::NotConfigured("OPENROUTER_API_KEY".into()));
    }

    #[test]
    fn test_local_provider_uses_placeholder_key() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("DEFAULT_PROVIDER", "lm-studio"),
            ("LM_STUDIO_MODEL", "qwen"),
            ("LM_STUDIO_BASE_URL", "http://10.0.0.2:1234/v1/"),
        ]))
        .unwrap();
        assert_eq!(config.kind, ProviderKind::LmStudio);
        assert_eq!(config.api_key, LOCAL_API_KEY);
        assert_eq!(config.base_url, "http://10.0.0.2:1234/v1");
    }

    #[test]
    fn test_missing_model_rejected() {
        let err = ProviderConfig::from_lookup(lookup(&[("DEFAULT_PROVIDER", "cherry")])).unwrap_err();
        assert_eq!(err, LlmError::NotConfigured("CHERRY_MODEL".into()));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::for_kind(
            ProviderKind::OpenRouter,
            lookup(&[("OPENROUTER_API_KEY", "sk-secret"), ("OPENROUTER_MODEL", "m")]),
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error": {"message": "invalid api key"}}"#;
        assert_eq!(
            classify_status(401, body, "m", None),
            LlmError::Authentication("invalid api key".into())
        );
        assert_eq!(classify_status(404, "", "gpt-x", None), LlmError::ModelNotFound("gpt-x".into()));
        assert_eq!(
            classify_status(429, "", "m", Some(Duration::from_secs(2))),
            LlmError::RateLimit {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert!(classify_status(503, "overloaded", "m", None).is_retryable());
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi there"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "hi there");
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
