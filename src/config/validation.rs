//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities, rates and TTLs > 0)
//! - Detect conflicting endpoint rules and duplicate scopes
//! - Check secrets are long enough to be worth having
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::security::client_ip::parse_trusted_proxy;

/// Minimum API key length in characters.
pub const MIN_API_KEY_LEN: usize = 32;

/// Slowest accepted refill: one token a day.
pub const MIN_REFILL_PER_MINUTE: f64 = 1.0 / (24.0 * 60.0);

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("endpoint pattern `{0}` must start with `/`")]
    RelativePattern(String),

    #[error("endpoint pattern `{0}` is declared more than once")]
    DuplicatePattern(String),

    #[error("rate limit scope `{0}` is declared more than once")]
    DuplicateScope(String),

    #[error("rate limit scope `global` is missing")]
    MissingGlobalScope,

    #[error("rate limit scope `{0}` needs a positive capacity and a refill rate of at least one token a day")]
    EmptyScope(String),

    #[error("api key must be at least {MIN_API_KEY_LEN} characters when enabled")]
    WeakApiKey,

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("trusted proxy `{0}` is neither an IP address nor a CIDR")]
    InvalidTrustedProxy(String),

    #[error("action route prefix `{0}` must start with `/` and not end with one")]
    InvalidActionPrefix(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut patterns = HashSet::new();
    for rule in &config.endpoints.rules {
        if !rule.pattern.starts_with('/') {
            errors.push(ValidationError::RelativePattern(rule.pattern.clone()));
        }
        if !patterns.insert(rule.pattern.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicatePattern(rule.pattern.clone()));
        }
    }

    let mut scopes = HashSet::new();
    for scope in &config.rate_limit.scopes {
        if !scopes.insert(scope.name.as_str()) {
            errors.push(ValidationError::DuplicateScope(scope.name.clone()));
        }
        let rate = scope.refill_per_minute;
        if scope.capacity == 0 || !rate.is_finite() || rate < MIN_REFILL_PER_MINUTE {
            errors.push(ValidationError::EmptyScope(scope.name.clone()));
        }
        for path in &scope.paths {
            if !path.starts_with('/') {
                errors.push(ValidationError::RelativePattern(path.clone()));
            }
        }
    }
    if !scopes.contains("global") {
        errors.push(ValidationError::MissingGlobalScope);
    }

    if config.auth.api_key_enabled && config.auth.api_key.chars().count() < MIN_API_KEY_LEN {
        errors.push(ValidationError::WeakApiKey);
    }

    let durations = [
        ("auth.session_ttl_secs", config.auth.session_ttl_secs),
        ("csrf.ttl_secs", config.csrf.ttl_secs),
        ("action_tokens.ttl_secs", config.action_tokens.ttl_secs),
        ("maintenance.sweep_interval_secs", config.maintenance.sweep_interval_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (name, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(name));
        }
    }

    for proxy in &config.transport.trusted_proxies {
        if parse_trusted_proxy(proxy).is_none() {
            errors.push(ValidationError::InvalidTrustedProxy(proxy.clone()));
        }
    }

    for prefix in [
        &config.action_tokens.approve_prefix,
        &config.action_tokens.reject_prefix,
    ] {
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            errors.push(ValidationError::InvalidActionPrefix(prefix.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
