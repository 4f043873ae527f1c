//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`ServiceConfig`], and run
//! validation before returning. This is the primary entry point for loading
//! configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::ServiceConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "ELI5_CONFIG";

/// Load a [`ServiceConfig`] from a TOML file.
///
/// # Errors
///
/// - `ConfigError::Io` if the file cannot be read.
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
///
/// # Example
///
/// ```rust,ignore
/// use eli5_orchestrator::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("eli5.toml"))?;
/// println!("Serving on port {}", config.server.port);
/// ```
pub fn load_from_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`ServiceConfig`] from a TOML string.
///
/// `source_name` identifies the source in error messages.
///
/// # Errors
///
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

/// Load the config named by `ELI5_CONFIG`, or the validated defaults if unset.
///
/// # Errors
///
/// Same as [`load_from_file`] when the variable is set.
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_from_file(Path::new(&path)),
        _ => load_from_str("", "<defaults>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[server]
port = 8123

[provider]
kind = "echo"
model = "echo-model"
timeout_ms = 2000
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.provider.kind, ProviderKind::Echo);
    }

    #[test]
    fn test_load_from_str_empty_uses_defaults() {
        let config = load_from_str("", "empty").expect("test: defaults are valid");
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let err = load_from_str("not valid toml [[[", "bad.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let err = load_from_str("[provider]\nmodel = \"\"\n", "empty-model.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("provider.model"));
    }

    #[test]
    fn test_load_from_str_source_name_appears_in_error() {
        let err = load_from_str("invalid [[[", "my-source.toml").unwrap_err();
        assert!(err.to_string().contains("my-source.toml"));
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("eli5.toml");
        let mut f = std::fs::File::create(&path).expect("test: create file");
        f.write_all(VALID_TOML.as_bytes()).expect("test: write");
        drop(f);

        let config = load_from_file(&path).expect("test: load from file");
        assert_eq!(config.provider.model, "echo-model");
    }

    #[test]
    fn test_load_from_file_missing_file_returns_io_error() {
        let err = load_from_file(Path::new("/nonexistent/path/eli5.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file_invalid_values_returns_validation_error() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "[provider]\ntimeout_ms = 0\n").expect("test: write");

        let err = load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
