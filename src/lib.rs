//! # eli5-orchestrator
//!
//! Turns a topic plus a complexity tier into a tier-appropriate explanation
//! generated by a pluggable LLM provider, with token usage and a cost
//! estimate attached.
//!
//! ## Architecture
//!
//! ```text
//! POST /explain → validate(topic, tier) → build GenerationRequest
//!               → provider.generate (deadline + cancellation) → cost → JSON
//! ```
//!
//! The complexity table is an immutable static; providers sit behind the
//! [`GenerationProvider`] trait so the orchestrator can be exercised with a
//! local [`EchoProvider`] or a test double.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![warn(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod cancel;
pub mod complexity;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod pricing;
pub mod provider;
pub mod web_api;

// Re-exports for convenience
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use complexity::{Complexity, ComplexityProfile, ComplexityRegistry};
pub use config::LogFormat;
pub use orchestrator::{
    ExplainError, ExplanationOrchestrator, ExplanationRequest, ExplanationResult,
    OrchestratorSettings,
};
pub use pricing::RateTable;
pub use provider::{
    AnthropicProvider, EchoProvider, GenerationProvider, GenerationRequest, GenerationResponse,
    OpenAiProvider, ProviderError, UnconfiguredProvider,
};

/// Initialise the global tracing subscriber.
///
/// The `LOG_FORMAT` environment variable, when set, overrides `default_format`:
/// - `"json"`: structured JSON output for log aggregators
/// - `"pretty"`: human-readable output for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`) and
/// defaults to `info`.
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use eli5_orchestrator::{init_tracing, LogFormat, OrchestratorError};
/// # fn example() -> Result<(), OrchestratorError> {
/// init_tracing(LogFormat::Pretty)?;
/// # Ok(()) }
/// ```
pub fn init_tracing(default_format: LogFormat) -> Result<(), OrchestratorError> {
    let format = match std::env::var("LOG_FORMAT").ok().as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => default_format,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
    };

    result.map_err(|e| OrchestratorError::Other(format!("tracing init failed: {e}")))
}

/// Top-level service errors.
///
/// Startup and serving failures are mapped to a variant here. Per-request
/// failures use [`ExplainError`] instead.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A configuration value is missing or invalid.
    ///
    /// Returned at startup so that misconfiguration surfaces immediately
    /// rather than at the first request.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The HTTP server failed to bind or terminated abnormally.
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

impl From<config::validation::ConfigError> for OrchestratorError {
    fn from(e: config::validation::ConfigError) -> Self {
        OrchestratorError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = OrchestratorError::ConfigError("provider.model is empty".into());
        assert_eq!(err.to_string(), "configuration error: provider.model is empty");
    }

    #[test]
    fn test_server_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = OrchestratorError::Server(io);
        assert!(err.to_string().contains("port taken"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_converts() {
        let err: OrchestratorError =
            config::validation::ConfigError::Validation("bad port".into()).into();
        assert!(matches!(err, OrchestratorError::ConfigError(ref m) if m.contains("bad port")));
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        // Another test may have installed a subscriber already.
        let _ = init_tracing(LogFormat::Pretty);
        let result = init_tracing(LogFormat::Json);
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}
