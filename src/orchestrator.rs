//! # Stage: Explanation Orchestrator
//!
//! ## Responsibility
//! Validate an [`ExplanationRequest`] against the complexity registry, build
//! the provider request, run the provider call under a deadline and a
//! cancellation signal, and assemble the [`ExplanationResult`].
//!
//! ## Guarantees
//! - Validation happens before any provider call
//! - The output ceiling and temperature come only from the resolved profile
//! - Every provider failure becomes [`ExplainError::UpstreamFailure`] whose
//!   `Display` is a fixed caller-safe message
//! - No retries; one request makes at most one provider call
//!
//! ## NOT Responsible For
//! - HTTP status mapping (that belongs to `web_api`)
//! - Choosing or constructing providers (that belongs to `main`)

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::complexity::{Complexity, ComplexityProfile, ComplexityRegistry};
use crate::metrics::{self, outcome};
use crate::pricing::RateTable;
use crate::provider::{GenerationProvider, GenerationRequest, ProviderError};

/// Message returned to callers for every upstream failure.
pub const UPSTREAM_FAILURE_MESSAGE: &str =
    "The explanation service is temporarily unavailable. Please try again later.";

/// Tutor framing shared by every tier; the profile instruction and ceiling
/// are appended to it.
const FRAMING_DIRECTIVE: &str = "You are a friendly tutor who explains topics with analogies, \
examples, and a conversational tone. Explain the topic the user sends for the audience \
described below, and keep the whole answer within the length limit.";

/// Default maximum topic length in characters.
pub const DEFAULT_MAX_TOPIC_CHARS: usize = 500;

/// Caller-supplied input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    /// Topic to explain.
    pub topic: String,
    /// Complexity tier identifier (e.g. `"eli5"`).
    pub complexity: String,
}

impl ExplanationRequest {
    /// Convenience constructor.
    pub fn new(topic: impl Into<String>, complexity: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            complexity: complexity.into(),
        }
    }
}

/// Successful outbound payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationResult {
    /// Always `true`; failures are reported through [`ExplainError`].
    pub success: bool,
    /// The (trimmed) topic that was explained.
    pub topic: String,
    /// Resolved complexity tier.
    pub complexity: Complexity,
    /// Generated explanation.
    pub explanation: String,
    /// Tokens reported by the provider.
    pub tokens_used: u64,
    /// Model that served the request.
    pub model: String,
    /// Estimated cost, e.g. `"$0.000180"`.
    #[serde(rename = "cost")]
    pub estimated_cost: String,
}

/// Request field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputField {
    /// The `topic` field.
    Topic,
    /// The `complexity` field.
    Complexity,
}

impl InputField {
    /// Wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            InputField::Topic => "topic",
            InputField::Complexity => "complexity",
        }
    }
}

/// Per-request failure.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// The caller's payload failed validation.
    #[error("{message}")]
    InvalidInput {
        /// Offending field.
        field: InputField,
        /// Actionable, caller-facing message.
        message: String,
        /// Accepted values, for enumerated fields.
        allowed: Option<Vec<&'static str>>,
    },

    /// The provider could not produce an explanation.
    ///
    /// Displays only [`UPSTREAM_FAILURE_MESSAGE`]; use [`ExplainError::detail`]
    /// for diagnostics.
    #[error("{}", UPSTREAM_FAILURE_MESSAGE)]
    UpstreamFailure(#[source] ProviderError),
}

impl ExplainError {
    /// Provider detail for server-side logs, if this is an upstream failure.
    pub fn detail(&self) -> Option<&ProviderError> {
        match self {
            ExplainError::UpstreamFailure(e) => Some(e),
            ExplainError::InvalidInput { .. } => None,
        }
    }

    fn invalid_topic(message: impl Into<String>) -> Self {
        ExplainError::InvalidInput {
            field: InputField::Topic,
            message: message.into(),
            allowed: None,
        }
    }
}

/// Operator-controlled knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Deadline for one provider call.
    pub timeout: Duration,
    /// Maximum topic length in characters, after trimming.
    pub max_topic_chars: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_topic_chars: DEFAULT_MAX_TOPIC_CHARS,
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedRequest<'a> {
    /// Trimmed topic.
    pub topic: &'a str,
    /// Resolved profile.
    pub profile: &'static ComplexityProfile,
}

/// Validates requests, calls the provider, and shapes results.
///
/// Holds no per-request state; share one instance behind an `Arc`.
pub struct ExplanationOrchestrator {
    registry: &'static ComplexityRegistry,
    provider: Arc<dyn GenerationProvider>,
    rates: RateTable,
    settings: OrchestratorSettings,
}

impl ExplanationOrchestrator {
    /// Create an orchestrator over the global complexity registry.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        rates: RateTable,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry: ComplexityRegistry::global(),
            provider,
            rates,
            settings,
        }
    }

    /// The configured provider.
    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// The active settings.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// The complexity registry requests are validated against.
    pub fn registry(&self) -> &'static ComplexityRegistry {
        self.registry
    }

    /// Check a request without calling the provider.
    ///
    /// The topic is checked before the complexity, so a request wrong on
    /// both counts reports the topic.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidInput`] naming the offending field.
    pub fn validate<'a>(
        &self,
        request: &'a ExplanationRequest,
    ) -> Result<ValidatedRequest<'a>, ExplainError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(ExplainError::invalid_topic(
                "Please provide a topic to explain",
            ));
        }
        let len = topic.chars().count();
        if len > self.settings.max_topic_chars {
            return Err(ExplainError::invalid_topic(format!(
                "Topic is too long ({len} characters); the limit is {}",
                self.settings.max_topic_chars
            )));
        }

        let profile = self.registry.lookup(&request.complexity).map_err(|e| {
            let allowed = self.registry.allowed_ids();
            ExplainError::InvalidInput {
                field: InputField::Complexity,
                message: format!(
                    "Unknown complexity '{}'; expected one of: {}",
                    e.requested,
                    allowed.join(", ")
                ),
                allowed: Some(allowed),
            }
        })?;

        Ok(ValidatedRequest { topic, profile })
    }

    /// Build the provider request for a validated request.
    pub fn build_request(&self, validated: &ValidatedRequest<'_>) -> GenerationRequest {
        let profile = validated.profile;
        GenerationRequest {
            model: self.settings.model.clone(),
            system_instruction: format!(
                "{FRAMING_DIRECTIVE}\n\nAudience: {}\nLength limit: {} tokens.",
                profile.instruction, profile.max_output_tokens
            ),
            user_content: validated.topic.to_string(),
            max_output_tokens: profile.max_output_tokens,
            temperature: profile.temperature,
        }
    }

    /// Produce an explanation.
    ///
    /// # Errors
    ///
    /// - [`ExplainError::InvalidInput`] if validation fails (no provider call)
    /// - [`ExplainError::UpstreamFailure`] if the provider fails, times out,
    ///   returns empty text, or `cancel` fires first
    pub async fn explain(
        &self,
        request: ExplanationRequest,
        mut cancel: CancelSignal,
    ) -> Result<ExplanationResult, ExplainError> {
        let validated = match self.validate(&request) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "explain request rejected");
                metrics::inc_request("invalid", outcome::INVALID_INPUT);
                return Err(e);
            }
        };
        let tier = validated.profile.id;
        let generation = self.build_request(&validated);

        let started = Instant::now();
        let call_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(self.settings.timeout, self.provider.generate(&generation)) => {
                result.unwrap_or(Err(ProviderError::Timeout(self.settings.timeout)))
            }
        };
        let elapsed = started.elapsed();
        metrics::record_upstream_latency(self.provider.name(), elapsed);

        let response = call_result
            .and_then(|r| {
                if r.text.trim().is_empty() {
                    Err(ProviderError::EmptyContent)
                } else {
                    Ok(r)
                }
            })
            .map_err(|e| {
                warn!(
                    complexity = %tier,
                    provider = self.provider.name(),
                    error_kind = e.kind(),
                    error = %e,
                    latency_ms = elapsed.as_millis() as u64,
                    "provider call failed"
                );
                metrics::inc_request(tier.as_str(), outcome::UPSTREAM_FAILURE);
                ExplainError::UpstreamFailure(e)
            })?;

        let estimated_cost = self.rates.estimate(response.tokens_used, &response.model);
        metrics::inc_request(tier.as_str(), outcome::SUCCESS);
        metrics::add_tokens(&response.model, response.tokens_used);
        info!(
            complexity = %tier,
            model = %response.model,
            tokens_used = response.tokens_used,
            cost = %estimated_cost,
            latency_ms = elapsed.as_millis() as u64,
            "explanation generated"
        );

        Ok(ExplanationResult {
            success: true,
            topic: validated.topic.to_string(),
            complexity: tier,
            explanation: response.text,
            tokens_used: response.tokens_used,
            model: response.model,
            estimated_cost,
        })
    }
}
