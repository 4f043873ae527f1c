//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`ServiceConfig`] that cannot
//! be expressed through the type system alone.
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::{ProviderKind, ServiceConfig};

/// Longest provider deadline accepted: 10 minutes.
const MAX_PROVIDER_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "provider.timeout_ms").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Validate all semantic constraints on a [`ServiceConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Errors
///
/// Returns every violation found.
pub fn validate(config: &ServiceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Server ───────────────────────────────────────────────────────
    if config.server.host.trim().is_empty() {
        errors.push(invalid("server.host", "", "host must not be empty"));
    }
    if config.server.port == 0 {
        errors.push(invalid("server.port", 0, "port must be at least 1"));
    }
    if config.server.max_request_size == 0 {
        errors.push(invalid(
            "server.max_request_size",
            0,
            "must be at least 1 byte",
        ));
    }
    if config.server.cors_allowed_origins.is_empty() {
        errors.push(invalid(
            "server.cors_allowed_origins",
            "[]",
            "list at least one origin, or \"*\"",
        ));
    }
    for origin in &config.server.cors_allowed_origins {
        if origin.trim().is_empty() {
            errors.push(invalid(
                "server.cors_allowed_origins",
                "\"\"",
                "origins must not be empty strings",
            ));
        }
    }

    // ── Provider ─────────────────────────────────────────────────────
    if config.provider.model.trim().is_empty() {
        errors.push(invalid(
            "provider.model",
            "",
            "model name must not be empty",
        ));
    }
    let model = config.provider.model.as_str();
    let foreign_prefix = match config.provider.kind {
        ProviderKind::Anthropic => ["gpt-", "o1", "o3"]
            .into_iter()
            .find(|prefix| model.starts_with(prefix)),
        ProviderKind::OpenAi => model.starts_with("claude-").then_some("claude-"),
        ProviderKind::Echo => None,
    };
    if let Some(prefix) = foreign_prefix {
        errors.push(ConfigError::InvalidField {
            field: "provider.model".into(),
            value: model.to_string(),
            reason: format!(
                "'{prefix}' models are not served by the {:?} backend; set provider.model explicitly",
                config.provider.kind
            ),
        });
    }
    if config.provider.timeout_ms == 0 || config.provider.timeout_ms > MAX_PROVIDER_TIMEOUT_MS {
        errors.push(invalid(
            "provider.timeout_ms",
            config.provider.timeout_ms,
            "must be between 1 and 600000",
        ));
    }
    if let Some(url) = &config.provider.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(invalid(
                "provider.base_url",
                url,
                "must start with http:// or https://",
            ));
        }
    }

    // ── Limits ───────────────────────────────────────────────────────
    if config.limits.max_topic_chars == 0 {
        errors.push(invalid(
            "limits.max_topic_chars",
            0,
            "must be at least 1",
        ));
    }

    // ── Pricing ──────────────────────────────────────────────────────
    let default_price = config.pricing.default_usd_per_million;
    if !default_price.is_finite() || default_price < 0.0 {
        errors.push(invalid(
            "pricing.default_usd_per_million",
            default_price,
            "must be a finite, non-negative number",
        ));
    }
    for (model, price) in &config.pricing.models {
        if !price.is_finite() || *price < 0.0 {
            errors.push(invalid(
                &format!("pricing.models.{model}"),
                price,
                "must be a finite, non-negative number",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidField { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_host_rejected() {
        let mut c = ServiceConfig::default();
        c.server.host = "  ".into();
        let errs = validate(&c).unwrap_err();
        assert_eq!(field_names(&errs), vec!["server.host"]);
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut c = ServiceConfig::default();
        c.server.port = 0;
        assert_eq!(field_names(&validate(&c).unwrap_err()), vec!["server.port"]);
    }

    #[test]
    fn test_zero_request_size_rejected() {
        let mut c = ServiceConfig::default();
        c.server.max_request_size = 0;
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["server.max_request_size"]
        );
    }

    #[test]
    fn test_empty_cors_list_rejected() {
        let mut c = ServiceConfig::default();
        c.server.cors_allowed_origins.clear();
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["server.cors_allowed_origins"]
        );
    }

    #[test]
    fn test_blank_cors_origin_rejected() {
        let mut c = ServiceConfig::default();
        c.server.cors_allowed_origins = vec!["https://ok.example".into(), "".into()];
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["server.cors_allowed_origins"]
        );
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.model = String::new();
        assert_eq!(field_names(&validate(&c).unwrap_err()), vec!["provider.model"]);
    }

    #[test]
    fn test_anthropic_with_default_openai_model_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.kind = ProviderKind::Anthropic;
        assert_eq!(field_names(&validate(&c).unwrap_err()), vec!["provider.model"]);

        c.provider.model = "claude-3-5-haiku-latest".into();
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn test_openai_with_claude_model_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.model = "claude-3-5-haiku-latest".into();
        assert_eq!(field_names(&validate(&c).unwrap_err()), vec!["provider.model"]);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.timeout_ms = 0;
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["provider.timeout_ms"]
        );
    }

    #[test]
    fn test_excessive_timeout_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.timeout_ms = MAX_PROVIDER_TIMEOUT_MS + 1;
        assert!(validate(&c).is_err());
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let mut c = ServiceConfig::default();
        c.provider.base_url = Some("ftp://example.com".into());
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["provider.base_url"]
        );
    }

    #[test]
    fn test_zero_topic_limit_rejected() {
        let mut c = ServiceConfig::default();
        c.limits.max_topic_chars = 0;
        assert_eq!(
            field_names(&validate(&c).unwrap_err()),
            vec!["limits.max_topic_chars"]
        );
    }

    #[test]
    fn test_negative_prices_rejected() {
        let mut c = ServiceConfig::default();
        c.pricing.default_usd_per_million = -1.0;
        c.pricing.models.insert("gpt-4o".into(), f64::INFINITY);
        let names = field_names(&validate(&c).unwrap_err());
        assert!(names.contains(&"pricing.default_usd_per_million".to_string()));
        assert!(names.contains(&"pricing.models.gpt-4o".to_string()));
    }

    #[test]
    fn test_all_errors_collected() {
        let mut c = ServiceConfig::default();
        c.server.port = 0;
        c.provider.model = String::new();
        c.limits.max_topic_chars = 0;
        assert_eq!(validate(&c).unwrap_err().len(), 3);
    }

    #[test]
    fn test_invalid_field_display_includes_path_and_reason() {
        let err = invalid("provider.timeout_ms", 0, "must be between 1 and 600000");
        let msg = err.to_string();
        assert!(msg.contains("provider.timeout_ms"));
        assert!(msg.contains("600000"));
    }
}
