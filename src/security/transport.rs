//! Transport hardening decisions.
//!
//! Pure functions: no state, no I/O. The caller supplies the connection
//! scheme and a forwarded-proto value that it has already filtered through
//! the trusted proxy check.

use std::str::FromStr;

use axum::http::uri::Authority;

use crate::config::schema::TransportConfig;

/// Request scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Https)
    }
}

/// What to do with a request at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportDecision {
    /// Continue; `secure` drives HSTS and cookie attributes.
    Proceed { secure: bool },
    /// Send a permanent redirect to the HTTPS location.
    Redirect { location: String },
    /// A redirect is needed but no trustworthy host is available.
    InvalidHost,
}

/// HTTPS redirect policy.
#[derive(Debug, Clone)]
pub struct TransportPolicy {
    force_https: bool,
    public_host: Option<String>,
}

impl TransportPolicy {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            force_https: config.force_https,
            public_host: config.public_host.clone(),
        }
    }

    /// Scheme the client actually used.
    ///
    /// Only the first value of a forwarded-proto list is considered, since
    /// that is the one set by the outermost proxy.
    pub fn effective_scheme(connection: Scheme, forwarded_proto: Option<&str>) -> Scheme {
        let forwarded = forwarded_proto
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_ascii_lowercase());
        match forwarded.as_deref() {
            Some("https") => Scheme::Https,
            Some("http") => Scheme::Http,
            _ => connection,
        }
    }

    /// Decide whether to redirect.
    pub fn decide(
        &self,
        connection: Scheme,
        forwarded_proto: Option<&str>,
        host: Option<&str>,
        path_and_query: &str,
    ) -> TransportDecision {
        let scheme = Self::effective_scheme(connection, forwarded_proto);
        if scheme.is_secure() || !self.force_https {
            return TransportDecision::Proceed {
                secure: scheme.is_secure(),
            };
        }

        let host = match self.public_host.as_deref().or(host).and_then(valid_host) {
            Some(host) => host,
            None => return TransportDecision::InvalidHost,
        };
        let path = if path_and_query.starts_with('/') {
            path_and_query
        } else {
            "/"
        };
        TransportDecision::Redirect {
            location: format!("https://{host}{path}"),
        }
    }
}

fn valid_host(host: &str) -> Option<&str> {
    let host = host.trim();
    if host.is_empty() || host.contains('@') {
        return None;
    }
    Authority::from_str(host).ok().map(|_| host)
}

/// Attributes applied to every cookie the gateway sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    pub fn for_scheme(secure: bool) -> Self {
        Self { secure }
    }

    /// `Set-Cookie` value. Always HttpOnly and SameSite=Lax; Secure only
    /// over HTTPS.
    pub fn set_cookie(&self, name: &str, value: &str, max_age_secs: i64) -> String {
        let mut cookie = format!(
            "{name}={value}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            max_age_secs.max(0)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that deletes `name`.
    pub fn clear_cookie(&self, name: &str) -> String {
        self.set_cookie(name, "", 0)
    }
}
