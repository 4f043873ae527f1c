//! # Stage: Service Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML configuration that wires the service: HTTP
//! bind address and CORS policy, provider backend and deadline, topic limits,
//! pricing, and log format.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `ServiceConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Total: every field has a documented default, so an empty file is valid
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - The complexity table (fixed in `complexity`, never configurable)
//! - Constructing providers (that belongs to `provider::from_config`)

pub mod loader;
pub mod validation;

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::orchestrator::{OrchestratorSettings, DEFAULT_MAX_TOPIC_CHARS};
use crate::pricing::RateTable;

// ── Default value functions ──────────────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Default request body cap: 64 KiB.
fn default_max_request_size() -> usize {
    64 * 1024
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default provider deadline: 30 000ms.
fn default_provider_timeout_ms() -> u64 {
    30_000
}

/// Default echo provider delay: 10ms.
fn default_echo_delay_ms() -> u64 {
    10
}

fn default_max_topic_chars() -> usize {
    DEFAULT_MAX_TOPIC_CHARS
}

/// Default price: 1.50 USD per million tokens.
fn default_usd_per_million() -> f64 {
    1.5
}

fn default_model_prices() -> BTreeMap<String, f64> {
    let mut models = BTreeMap::new();
    models.insert("gpt-4o-mini".to_string(), 1.5);
    models
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a service instance.
///
/// # Example
///
/// ```toml
/// [server]
/// port = 8000
///
/// [provider]
/// kind = "open_ai"
/// model = "gpt-4o-mini"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener and boundary policy.
    pub server: ServerSection,
    /// Generation provider backend.
    pub provider: ProviderSection,
    /// Request limits.
    pub limits: LimitsSection,
    /// Per-model token prices.
    pub pricing: PricingSection,
    /// Logging output.
    pub observability: ObservabilityConfig,
}

impl ServiceConfig {
    /// Orchestrator settings derived from this config.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            model: self.provider.model.clone(),
            timeout: self.provider.timeout(),
            max_topic_chars: self.limits.max_topic_chars,
        }
    }

    /// Rate table derived from this config.
    pub fn rate_table(&self) -> RateTable {
        RateTable::from_usd_per_million(
            self.pricing.default_usd_per_million,
            self.pricing
                .models
                .iter()
                .map(|(model, usd)| (model.as_str(), *usd)),
        )
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerSection {
    /// IP address or hostname to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Origins allowed by the CORS layer. `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
            cors_allowed_origins: default_cors_origins(),
        }
    }
}

// ── Provider ─────────────────────────────────────────────────────────────

/// Supported generation backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions (or any compatible server).
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Local echo provider for demos and tests.
    Echo,
}

impl ProviderKind {
    /// Environment variable the API key is read from when `api_key_env` is unset.
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Echo => None,
        }
    }
}

/// Provider backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderSection {
    /// Which backend to call.
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// API root override. `None` uses the backend's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. `None` uses the backend default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Deadline (ms) for one provider call.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Simulated generation delay (ms) for the `echo` backend.
    #[serde(default = "default_echo_delay_ms")]
    pub echo_delay_ms: u64,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::OpenAi
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            timeout_ms: default_provider_timeout_ms(),
            echo_delay_ms: default_echo_delay_ms(),
        }
    }
}

impl ProviderSection {
    /// Provider deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Echo backend delay as a [`Duration`].
    pub fn echo_delay(&self) -> Duration {
        Duration::from_millis(self.echo_delay_ms)
    }

    /// Effective API key environment variable, if the backend needs one.
    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.kind.default_api_key_env())
    }
}

// ── Limits ───────────────────────────────────────────────────────────────

/// Request validation limits.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LimitsSection {
    /// Maximum topic length in characters, after trimming.
    #[serde(default = "default_max_topic_chars")]
    pub max_topic_chars: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_topic_chars: default_max_topic_chars(),
        }
    }
}

// ── Pricing ──────────────────────────────────────────────────────────────

/// Token prices in USD per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PricingSection {
    /// Price for models with no entry (and no matching prefix) in `models`.
    #[serde(default = "default_usd_per_million")]
    pub default_usd_per_million: f64,
    /// Model identifier or prefix to price.
    #[serde(default = "default_model_prices")]
    pub models: BTreeMap<String, f64>,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            default_usd_per_million: default_usd_per_million(),
            models: default_model_prices(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format. `LOG_FORMAT` in the environment takes precedence.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

/// Export the JSON Schema for `ServiceConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(ServiceConfig);
    serde_json::to_string_pretty(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: ServiceConfig = toml::from_str("").expect("test: empty TOML parses");
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.server.cors_allowed_origins, vec!["*"]);
    }

    #[test]
    fn test_provider_kind_serializes_to_snake_case() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).expect("test: serialization");
        assert_eq!(json, "\"open_ai\"");
    }

    #[test]
    fn test_api_key_env_falls_back_to_backend_default() {
        let mut provider = ProviderSection::default();
        assert_eq!(provider.api_key_env(), Some("OPENAI_API_KEY"));
        provider.kind = ProviderKind::Anthropic;
        assert_eq!(provider.api_key_env(), Some("ANTHROPIC_API_KEY"));
        provider.kind = ProviderKind::Echo;
        assert_eq!(provider.api_key_env(), None);
        provider.api_key_env = Some("MY_KEY".into());
        assert_eq!(provider.api_key_env(), Some("MY_KEY"));
    }

    #[test]
    fn test_full_toml_parses() {
        let toml_str = r#"
[server]
host = "127.0.0.1"
port = 9000
max_request_size = 4096
cors_allowed_origins = ["https://eli5.example"]

[provider]
kind = "anthropic"
model = "claude-3-5-haiku-latest"
base_url = "http://localhost:1234/v1"
timeout_ms = 5000

[limits]
max_topic_chars = 200

[pricing]
default_usd_per_million = 4.0

[pricing.models]
"claude-3-5-haiku" = 4.0

[observability]
log_format = "json"
"#;
        let config: ServiceConfig = toml::from_str(toml_str).expect("test: full TOML parses");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(config.provider.timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.max_topic_chars, 200);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.rate_table().rate_for("claude-3-5-haiku-20241022"), 4_000);
    }

    #[test]
    fn test_orchestrator_settings_follow_config() {
        let mut config = ServiceConfig::default();
        config.provider.model = "gpt-4o".into();
        config.provider.timeout_ms = 1500;
        config.limits.max_topic_chars = 42;
        let settings = config.orchestrator_settings();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.timeout, Duration::from_millis(1500));
        assert_eq!(settings.max_topic_chars, 42);
    }

    #[test]
    fn test_echo_delay_defaults_and_parses() {
        assert_eq!(ProviderSection::default().echo_delay(), Duration::from_millis(10));
        let config: ServiceConfig =
            toml::from_str("[provider]\nkind = \"echo\"\necho_delay_ms = 0\n")
                .expect("test: echo TOML parses");
        assert_eq!(config.provider.echo_delay(), Duration::ZERO);
    }

    #[test]
    fn test_unknown_provider_kind_fails_to_parse() {
        let result: Result<ServiceConfig, _> = toml::from_str("[provider]\nkind = \"gemini\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ServiceConfig::default();
        let s = toml::to_string_pretty(&config).expect("test: serialize");
        let back: ServiceConfig = toml::from_str(&s).expect("test: deserialize");
        assert_eq!(config, back);
    }

    #[test]
    fn test_export_schema_produces_valid_json() {
        let schema = export_schema().expect("test: schema export");
        let parsed: serde_json::Value =
            serde_json::from_str(&schema).expect("test: schema is valid JSON");
        assert!(parsed.get("properties").is_some() || parsed.get("$ref").is_some());
    }
}
