//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `auth.api_key`.
pub const API_KEY_ENV: &str = "GATEKEEPER_API_KEY";

/// Environment variable overriding `webhook.secret`.
pub const WEBHOOK_SECRET_ENV: &str = "GATEKEEPER_WEBHOOK_SECRET";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Secrets found in the environment replace the ones in the file before
/// validation runs.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse, apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Replace secrets with values from `lookup` when present and non-empty.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
        config.auth.api_key = key;
    }
    if let Some(secret) = lookup(WEBHOOK_SECRET_ENV).filter(|v| !v.is_empty()) {
        config.webhook.secret = secret;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_overrides_replace_secrets() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |name| match name {
            API_KEY_ENV => Some("from-env".to_string()),
            WEBHOOK_SECRET_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.auth.api_key, "from-env");
        assert_eq!(config.webhook.secret, "");
    }

    #[test]
    fn loads_file_and_reports_validation_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [auth]
            api_key_enabled = false

            [csrf]
            ttl_secs = 0
            "#
        )
        .unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::ZeroDuration("csrf.ttl_secs")]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            parse_config("[auth\napi_key = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
