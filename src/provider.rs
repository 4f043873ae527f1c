//! Generation provider abstraction and implementations
//!
//! Provides the [`GenerationProvider`] trait and the backends behind it:
//! - [`OpenAiProvider`]: OpenAI chat completions (GPT-4o-mini, etc.)
//! - [`AnthropicProvider`]: Anthropic messages API
//! - [`EchoProvider`]: deterministic local provider for demos and tests
//! - [`UnconfiguredProvider`]: stands in when no API key is available
//!
//! ## Environment Variables
//!
//! - `OPENAI_API_KEY`: default key variable for [`OpenAiProvider`]
//! - `ANTHROPIC_API_KEY`: default key variable for [`AnthropicProvider`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ProviderKind, ProviderSection};

/// Default OpenAI API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Anthropic API root.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Longest provider error body kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Fully-constructed request handed to a provider.
///
/// Built only by the orchestrator from a resolved complexity profile; callers
/// of the service never set these fields directly.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier to invoke.
    pub model: String,
    /// System-level instruction (audience + framing).
    pub system_instruction: String,
    /// User-level content: the topic.
    pub user_content: String,
    /// Hard ceiling on generated tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Successful provider output.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    /// Generated explanation text (never empty).
    pub text: String,
    /// Tokens billed for the call as reported by the provider.
    pub tokens_used: u64,
    /// Model that actually served the call.
    pub model: String,
}

/// Every way a provider call can fail.
///
/// These carry provider detail and must never be rendered to callers; the
/// orchestrator wraps them in an `UpstreamFailure` with a generic message.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key was available at start-up.
    #[error("provider is not configured: {0}")]
    NotConfigured(String),

    /// The HTTP request could not be sent or the connection failed.
    #[error("provider connection failed: {0}")]
    Connect(String),

    /// The call exceeded its deadline.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("provider response was malformed: {0}")]
    Malformed(String),

    /// The response decoded but carried no generated text.
    #[error("provider returned no content")]
    EmptyContent,

    /// The caller went away before the call completed.
    #[error("provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::Connect(_) => "connect",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::EmptyContent => "empty_content",
            ProviderError::Cancelled => "cancelled",
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Connect(err.to_string())
        }
    }
}

/// Trait for language-generation backends.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via
/// `Arc<dyn GenerationProvider>`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn name(&self) -> &str;

    /// Whether the backend has what it needs (e.g. credentials) to serve calls.
    fn is_configured(&self) -> bool {
        true
    }

    /// Run one generation call.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, ProviderError>;
}

/// Read an API key from the named environment variable.
///
/// Empty values count as missing.
pub fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Read a non-success response into a [`ProviderError::Status`].
async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect();
    ProviderError::Status { status, body }
}

// ============================================================================
// Echo Provider (Testing)
// ============================================================================

/// Deterministic local provider.
///
/// Answers with the topic prefixed by a fixed phrase. Token usage is the
/// whitespace word count of the instruction plus the topic plus the answer,
/// capped at the request ceiling.
pub struct EchoProvider {
    /// Simulated generation delay
    pub delay: Duration,
}

impl EchoProvider {
    /// Echo provider with a 10ms simulated delay.
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }

    /// Echo provider with a custom delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;

        let text = format!("Here is an explanation of: {}", request.user_content);
        let words = request.system_instruction.split_whitespace().count()
            + request.user_content.split_whitespace().count()
            + text.split_whitespace().count();
        let tokens_used = (words as u64).min(u64::from(request.max_output_tokens));

        Ok(GenerationResponse {
            text,
            tokens_used,
            model: request.model.clone(),
        })
    }
}

// ============================================================================
// Unconfigured Provider
// ============================================================================

/// Placeholder used when the real backend has no credentials.
///
/// The service still starts so that the info and health endpoints work;
/// every generation call fails with [`ProviderError::NotConfigured`].
pub struct UnconfiguredProvider {
    backend: String,
    reason: String,
}

impl UnconfiguredProvider {
    /// Create a placeholder for `backend` explaining why it is unavailable.
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        &self.backend
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        Err(ProviderError::NotConfigured(self.reason.clone()))
    }
}

// ============================================================================
// OpenAI Provider
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// OpenAI chat completions request payload
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

/// OpenAI chat completions response
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    total_tokens: u64,
}

/// OpenAI chat completions provider.
///
/// ## Example
///
/// ```no_run
/// use eli5_orchestrator::provider::OpenAiProvider;
/// use std::time::Duration;
///
/// let provider = OpenAiProvider::new("sk-...")
///     .with_base_url("https://api.openai.com/v1")
///     .with_timeout(Duration::from_secs(30));
/// ```
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a provider using `api_key` against the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point at an OpenAI-compatible server (trailing slash is ignored).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "open_ai"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let body = OpenAiRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::EmptyContent)?;

        let usage = api_response
            .usage
            .ok_or_else(|| ProviderError::Malformed("missing usage block".to_string()))?;

        Ok(GenerationResponse {
            text,
            tokens_used: usage.total_tokens,
            model: api_response
                .model
                .unwrap_or_else(|| request.model.clone()),
        })
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

/// Anthropic messages request payload
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

/// Anthropic messages response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<AnthropicBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic messages API provider.
///
/// ## Example
///
/// ```no_run
/// use eli5_orchestrator::provider::AnthropicProvider;
///
/// let provider = AnthropicProvider::new("sk-ant-...");
/// ```
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Create a provider using `api_key` against the public Anthropic endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Point at a different API root (trailing slash is ignored).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let body = AnthropicRequest {
            model: &request.model,
            system: &request.system_instruction,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.user_content,
            }],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let text: String = api_response
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyContent);
        }

        let tokens_used = api_response
            .usage
            .input_tokens
            .checked_add(api_response.usage.output_tokens)
            .ok_or_else(|| ProviderError::Malformed("token usage overflow".to_string()))?;

        Ok(GenerationResponse {
            text,
            tokens_used,
            model: api_response
                .model
                .unwrap_or_else(|| request.model.clone()),
        })
    }
}

// ============================================================================
// Construction from config
// ============================================================================

/// Build the provider described by `section`, reading its API key from the
/// environment variable the section names.
///
/// A missing key yields an [`UnconfiguredProvider`] so the service still
/// starts and reports the problem through `/health`.
pub fn from_config(section: &ProviderSection) -> Arc<dyn GenerationProvider> {
    let api_key = section.api_key_env().and_then(api_key_from_env);
    from_config_with_key(section, api_key)
}

/// [`from_config`] with the API key supplied by the caller.
pub fn from_config_with_key(
    section: &ProviderSection,
    api_key: Option<String>,
) -> Arc<dyn GenerationProvider> {
    let timeout = section.timeout();
    match (section.kind, api_key) {
        (ProviderKind::Echo, _) => Arc::new(EchoProvider::with_delay(section.echo_delay())),
        (ProviderKind::OpenAi, Some(key)) => {
            let mut provider = OpenAiProvider::new(key).with_timeout(timeout);
            if let Some(url) = &section.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Arc::new(provider)
        }
        (ProviderKind::Anthropic, Some(key)) => {
            let mut provider = AnthropicProvider::new(key).with_timeout(timeout);
            if let Some(url) = &section.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Arc::new(provider)
        }
        (kind, None) => {
            let backend = match kind {
                ProviderKind::Anthropic => "anthropic",
                _ => "open_ai",
            };
            let var = section.api_key_env().unwrap_or("API key variable");
            Arc::new(UnconfiguredProvider::new(
                backend,
                format!("{var} is not set"),
            ))
        }
    }
}
