//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::classifier::EndpointKind;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Endpoint protection rules.
    pub endpoints: EndpointConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// API key and session settings.
    pub auth: AuthConfig,

    /// Webhook shared-secret settings.
    pub webhook: WebhookConfig,

    /// CSRF token settings.
    pub csrf: CsrfConfig,

    /// Approve/reject token settings.
    pub action_tokens: ActionTokenConfig,

    /// HTTPS redirect and proxy trust.
    pub transport: TransportConfig,

    /// Eviction sweep schedule.
    pub maintenance: MaintenanceConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// TLS is terminated on this listener, so the connection scheme is https.
    pub tls_terminated: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            tls_terminated: false,
        }
    }
}

/// A single endpoint rule as written in the config file.
///
/// A pattern ending in `/*` is a prefix rule covering the base path and
/// everything below it; any other pattern is an exact path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointRuleConfig {
    pub pattern: String,
    pub kind: EndpointKind,
}

impl EndpointRuleConfig {
    pub fn new(pattern: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }
}

/// Endpoint classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Unmatched paths are Protected instead of Public.
    pub deny_by_default: bool,

    /// Rule set. Evaluation order does not depend on list order.
    pub rules: Vec<EndpointRuleConfig>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        use EndpointKind::*;
        Self {
            deny_by_default: false,
            rules: vec![
                EndpointRuleConfig::new("/", Public),
                EndpointRuleConfig::new("/health", Public),
                EndpointRuleConfig::new("/login", Public),
                EndpointRuleConfig::new("/logout", Public),
                EndpointRuleConfig::new("/approve/*", Public),
                EndpointRuleConfig::new("/reject/*", Public),
                EndpointRuleConfig::new("/admin/*", Protected),
                EndpointRuleConfig::new("/api/admin/*", Protected),
                EndpointRuleConfig::new("/config/*", Protected),
                EndpointRuleConfig::new("/logs/*", Protected),
                EndpointRuleConfig::new("/stats/*", Protected),
                EndpointRuleConfig::new("/debug/*", Protected),
                EndpointRuleConfig::new("/webhook/*", Webhook),
            ],
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Buckets untouched for this long are evicted by the maintenance sweep.
    pub idle_eviction_secs: u64,

    /// Limiter scopes. A scope named `global` must exist.
    pub scopes: Vec<ScopeConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_eviction_secs: 3600,
            scopes: vec![
                ScopeConfig {
                    name: "global".to_string(),
                    capacity: 60,
                    refill_per_minute: 60.0,
                    paths: Vec::new(),
                    per_endpoint: false,
                },
                ScopeConfig {
                    name: "token-generation".to_string(),
                    capacity: 10,
                    refill_per_minute: 10.0,
                    paths: vec![
                        "/login".to_string(),
                        "/approve/*".to_string(),
                        "/reject/*".to_string(),
                    ],
                    per_endpoint: false,
                },
                ScopeConfig {
                    name: "webhook".to_string(),
                    capacity: 10,
                    refill_per_minute: 10.0,
                    paths: vec!["/webhook/*".to_string()],
                    per_endpoint: false,
                },
            ],
        }
    }
}

/// One limiter scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopeConfig {
    /// Scope name (e.g. "global", "token-generation", "webhook").
    pub name: String,

    /// Bucket capacity.
    pub capacity: u32,

    /// Tokens added per minute.
    pub refill_per_minute: f64,

    /// Path patterns routed to this scope (same syntax as endpoint rules).
    #[serde(default)]
    pub paths: Vec<String>,

    /// Key buckets by (identity, normalized path) instead of identity alone.
    #[serde(default)]
    pub per_endpoint: bool,
}

/// API key and session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accept the static API key as a credential.
    pub api_key_enabled: bool,

    /// The static API key. Overridden by `GATEKEEPER_API_KEY`.
    pub api_key: String,

    /// Header carrying the API key.
    pub api_key_header: String,

    /// Lifetime of a session minted by `/login`.
    pub session_ttl_secs: u64,

    /// Session cookie name.
    pub session_cookie: String,

    /// Answer credential failures on protected paths with 404 instead of 401.
    pub conceal_protected: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_enabled: true,
            api_key: String::new(),
            api_key_header: "X-API-Key".to_string(),
            session_ttl_secs: 8 * 3600,
            session_cookie: "gatekeeper_session".to_string(),
            conceal_protected: false,
        }
    }
}

/// Webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret. Empty means every webhook call is refused.
    /// Overridden by `GATEKEEPER_WEBHOOK_SECRET`.
    pub secret: String,

    /// Header carrying the shared secret.
    pub header: String,

    /// Largest accepted payload.
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            header: "X-Autobrr-Token".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Token lifetime in seconds.
    pub ttl_secs: u64,

    /// Header that may carry the token.
    pub header: String,

    /// Form or query field that may carry the token.
    pub form_field: String,

    /// Largest form body read while looking for the token.
    pub max_form_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            header: "X-CSRF-Token".to_string(),
            form_field: "csrf_token".to_string(),
            max_form_bytes: 16 * 1024,
        }
    }
}

/// Approve/reject token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionTokenConfig {
    /// Token lifetime in seconds (24h default).
    pub ttl_secs: u64,

    /// Route prefix for approvals; the token is the next path segment.
    pub approve_prefix: String,

    /// Route prefix for rejections.
    pub reject_prefix: String,

    /// Redeeming one token of a subject also consumes its sibling.
    pub revoke_siblings: bool,

    /// Optional JSON snapshot of the in-memory store.
    pub snapshot_path: Option<String>,
}

impl Default for ActionTokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            approve_prefix: "/approve".to_string(),
            reject_prefix: "/reject".to_string(),
            revoke_siblings: true,
            snapshot_path: None,
        }
    }
}

/// Transport hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Redirect plain HTTP to HTTPS.
    pub force_https: bool,

    /// Host used in redirect locations. Falls back to the Host header.
    pub public_host: Option<String>,

    /// Peers whose X-Forwarded-* headers are trusted (IPs or CIDRs).
    pub trusted_proxies: Vec<String>,

    /// HSTS max-age sent on secure responses.
    pub hsts_max_age_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            force_https: false,
            public_host: None,
            trusted_proxies: Vec::new(),
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// Maintenance sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between eviction sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = GatewayConfig::default();
        let scope = |name: &str| {
            config
                .rate_limit
                .scopes
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .unwrap()
        };
        assert_eq!(scope("global").capacity, 60);
        assert_eq!(scope("token-generation").capacity, 10);
        assert_eq!(scope("webhook").refill_per_minute, 10.0);
        assert_eq!(config.action_tokens.ttl_secs, 86_400);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [auth]
            api_key = "k"

            [[endpoints.rules]]
            pattern = "/private/*"
            kind = "protected"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.api_key, "k");
        assert_eq!(config.auth.api_key_header, "X-API-Key");
        assert_eq!(config.endpoints.rules.len(), 1);
        assert_eq!(config.endpoints.rules[0].kind, EndpointKind::Protected);
        assert_eq!(config.rate_limit.scopes.len(), 3);
    }
}
