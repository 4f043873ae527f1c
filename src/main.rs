//! eli5-orchestrator server binary
//!
//! Loads configuration, builds the configured provider, and serves the HTTP
//! API until Ctrl-C.
//!
//! ## Environment Variables
//!
//! - `ELI5_CONFIG=/path/to/eli5.toml`: configuration file (defaults if unset)
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`: provider credentials
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter (default: info)

use std::sync::Arc;

use eli5_orchestrator::complexity::{check_tier_ordering, ComplexityRegistry};
use eli5_orchestrator::config::loader;
use eli5_orchestrator::{
    init_tracing, metrics, provider, web_api, ExplanationOrchestrator, LogFormat,
    OrchestratorError,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), OrchestratorError> {
    let config = loader::load_from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.observability.log_format)
        .unwrap_or(LogFormat::Pretty);
    let _ = init_tracing(log_format);
    let config = config?;

    metrics::init_metrics()?;

    check_tier_ordering(ComplexityRegistry::global().profiles())
        .map_err(|e| OrchestratorError::ConfigError(e.to_string()))?;

    let provider = provider::from_config(&config.provider);
    if !provider.is_configured() {
        warn!(
            provider = provider.name(),
            "no API key found; /explain will fail until one is configured"
        );
    }

    info!(
        provider = provider.name(),
        model = %config.provider.model,
        timeout_ms = config.provider.timeout_ms,
        "Starting eli5-orchestrator"
    );

    let orchestrator = Arc::new(ExplanationOrchestrator::new(
        provider,
        config.rate_table(),
        config.orchestrator_settings(),
    ));

    web_api::start_server(&config.server, orchestrator, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutdown only on process exit");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight requests");
}
