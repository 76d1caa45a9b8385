//! The request gateway.
//!
//! # Responsibilities
//! - Run every inbound request through the security pipeline
//! - Attach the resolved [`RequestContext`] (and an [`ActionGrant`] for
//!   redeemed action tokens) to admitted requests
//! - Fold every failure into one [`GatewayError`]
//!
//! # Data Flow
//! ```text
//! request
//!     → client identity (trusted proxies only)
//!     → transport decision (308 to https, or proceed)
//!     → classify path
//!     → rate limit (429 + Retry-After)
//!     → Protected: API key or session        (401, or 404 when concealed)
//!     → Webhook: shared secret + JSON body   (401 for every failure)
//!     → non-safe action route: POST only (404), CSRF (403), then an
//!       action token issued for that route's action (401)
//!     → application handler
//! ```
//!
//! # Design Decisions
//! - Short-circuits on the first rejection
//! - Response bodies carry only the error kind; reasons go to the log
//! - HSTS is added here because only this layer knows the effective scheme

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::clock::SharedClock;
use crate::config::schema::GatewayConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::action_token::ActionTokenManager;
use crate::security::api_key::ApiKeyHandle;
use crate::security::classifier::{normalize_path, EndpointClassifier, EndpointKind};
use crate::security::client_ip::TrustedProxies;
use crate::security::csrf::CsrfGuard;
use crate::security::headers;
use crate::security::rate_limit::RateLimiter;
use crate::security::session::SessionStore;
use crate::security::transport::{Scheme, TransportDecision, TransportPolicy};
use crate::security::vault;
use crate::store::{Action, ActionTokenStore, RedeemError};

/// How an admitted request proved itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    None,
    ApiKey,
    Session,
    WebhookSecret,
}

/// Context attached to every admitted request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client: IpAddr,
    pub kind: EndpointKind,
    /// Normalized request path.
    pub path: String,
    /// Effective scheme was HTTPS.
    pub secure: bool,
    pub credential: Credential,
}

/// Attached when a non-safe action request redeemed its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionGrant {
    pub subject_id: String,
    pub action: Action,
}

/// Everything the gateway consults, built once from configuration.
#[derive(Debug)]
pub struct GatewayInner {
    pub config: GatewayConfig,
    pub classifier: EndpointClassifier,
    pub limiter: RateLimiter,
    pub api_key: Arc<ApiKeyHandle>,
    pub sessions: SessionStore,
    pub csrf: CsrfGuard,
    pub action_tokens: ActionTokenManager,
    pub proxies: TrustedProxies,
    pub transport: TransportPolicy,
    pub clock: SharedClock,
}

/// Shared gateway state.
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub inner: Arc<GatewayInner>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, store: Arc<dyn ActionTokenStore>, clock: SharedClock) -> Self {
        let seconds = |secs: u64| chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));

        let inner = GatewayInner {
            classifier: EndpointClassifier::new(&config.endpoints),
            limiter: RateLimiter::new(&config.rate_limit, clock.clone()),
            api_key: Arc::new(ApiKeyHandle::new(&config.auth)),
            sessions: SessionStore::new(seconds(config.auth.session_ttl_secs), clock.clone()),
            csrf: CsrfGuard::new(seconds(config.csrf.ttl_secs), clock.clone()),
            action_tokens: ActionTokenManager::new(
                store,
                seconds(config.action_tokens.ttl_secs),
                clock.clone(),
            ),
            proxies: TrustedProxies::new(&config.transport.trusted_proxies),
            transport: TransportPolicy::new(&config.transport),
            clock,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Handle used by the config watcher to swap the API key.
    pub fn api_key(&self) -> Arc<ApiKeyHandle> {
        self.inner.api_key.clone()
    }
}

/// Gateway middleware.
pub async fn gateway_middleware(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<GatewayState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let inner = &state.inner;
    let peer = peer.ip();
    let client = inner.proxies.client_ip(peer, request.headers());

    let connection = if inner.config.listener.tls_terminated {
        Scheme::Https
    } else {
        Scheme::Http
    };
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let forwarded_proto = inner.proxies.forwarded_proto(peer, request.headers());

    let secure = match inner
        .transport
        .decide(connection, forwarded_proto, host, path_and_query)
    {
        TransportDecision::Proceed { secure } => secure,
        TransportDecision::Redirect { location } => {
            tracing::debug!(client = %client, location = %location, "Redirecting to https");
            return redirect(&location);
        }
        TransportDecision::InvalidHost => {
            tracing::warn!(client = %client, "No usable host for https redirect");
            metrics::record_request("transport", GatewayError::BadRequest.label());
            return GatewayError::BadRequest.into_response();
        }
    };

    let mut response = match admit(inner, client, secure, request).await {
        Ok(request) => next.run(request).await,
        Err(error) => error.into_response(),
    };

    if secure {
        headers::apply_hsts(response.headers_mut(), inner.config.transport.hsts_max_age_secs);
    }
    response
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, value)]).into_response(),
        Err(_) => GatewayError::BadRequest.into_response(),
    }
}

async fn admit(
    inner: &GatewayInner,
    client: IpAddr,
    secure: bool,
    request: Request<Body>,
) -> Result<Request<Body>, GatewayError> {
    let raw_path = request.uri().path().to_string();
    let normalized = normalize_path(&raw_path);
    let kind = match &normalized {
        Some(path) => inner.classifier.classify_normalized(path),
        None => EndpointKind::Protected,
    };
    let path = normalized.unwrap_or_else(|| raw_path.clone());

    let result = run_checks(inner, client, kind, &raw_path, &path, request).await;
    match &result {
        Ok(_) => metrics::record_request(kind.as_str(), "admitted"),
        Err(error) => metrics::record_request(kind.as_str(), error.label()),
    }

    let (mut request, credential, grant) = result?;
    request.extensions_mut().insert(RequestContext {
        client,
        kind,
        path,
        secure,
        credential,
    });
    if let Some(grant) = grant {
        request.extensions_mut().insert(grant);
    }
    Ok(request)
}

type Admitted = (Request<Body>, Credential, Option<ActionGrant>);

async fn run_checks(
    inner: &GatewayInner,
    client: IpAddr,
    kind: EndpointKind,
    raw_path: &str,
    path: &str,
    request: Request<Body>,
) -> Result<Admitted, GatewayError> {
    let identity = client.to_string();

    if let Some(retry_after_secs) = inner.limiter.check(&identity, path, kind).retry_after_secs() {
        return Err(GatewayError::TooManyRequests { retry_after_secs });
    }

    let (request, credential) = match kind {
        EndpointKind::Public => (request, Credential::None),
        EndpointKind::Protected => {
            let credential = authenticate(inner, request.headers()).ok_or_else(|| {
                tracing::warn!(client = %client, path = %path, "Missing or invalid credential for protected path");
                if inner.config.auth.conceal_protected {
                    GatewayError::NotFound
                } else {
                    GatewayError::Unauthorized
                }
            })?;
            (request, credential)
        }
        EndpointKind::Webhook => (
            verify_webhook(inner, client, request).await?,
            Credential::WebhookSecret,
        ),
    };

    let Some((prefix, action)) = action_route(inner, path) else {
        return Ok((request, credential, None));
    };
    if is_safe(request.method()) {
        return Ok((request, credential, None));
    }

    // Only a POST on the canonical spelling reaches a handler; anything
    // else would spend the tokens and then miss the route.
    if request.method() != Method::POST {
        tracing::debug!(client = %client, method = %request.method(), "Unsupported method on action route");
        return Err(GatewayError::NotFound);
    }
    let token = last_segment(raw_path).ok_or(GatewayError::NotFound)?;
    if raw_path != format!("{prefix}/{token}") {
        return Err(GatewayError::NotFound);
    }
    let (request, csrf_token) = extract_csrf_token(inner, request).await?;
    inner
        .csrf
        .validate(csrf_token.as_deref(), path)
        .map_err(|rejection| {
            tracing::warn!(client = %client, reason = rejection.reason(), "CSRF check failed");
            GatewayError::Forbidden
        })?;

    let redemption = inner
        .action_tokens
        .redeem(&token, action)
        .await
        .map_err(|e| match e {
            RedeemError::Store(_) => GatewayError::Unavailable,
            _ => GatewayError::Unauthorized,
        })?;

    Ok((
        request,
        credential,
        Some(ActionGrant {
            subject_id: redemption.subject_id,
            action: redemption.action,
        }),
    ))
}

/// API key header, then session cookie.
fn authenticate(inner: &GatewayInner, headers: &HeaderMap) -> Option<Credential> {
    let presented = headers
        .get(inner.config.auth.api_key_header.as_str())
        .and_then(|v| v.to_str().ok());
    if inner.api_key.verify(presented) {
        return Some(Credential::ApiKey);
    }

    session_cookie(headers, &inner.config.auth.session_cookie)
        .filter(|id| inner.sessions.validate(id))
        .map(|_| Credential::Session)
}

/// Value of the cookie `name`, if sent.
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// Shared secret plus a non-empty JSON body, or one uniform 401.
async fn verify_webhook(
    inner: &GatewayInner,
    client: IpAddr,
    request: Request<Body>,
) -> Result<Request<Body>, GatewayError> {
    let config = &inner.config.webhook;
    let (parts, body) = request.into_parts();

    let presented = parts
        .headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let secret_ok = !config.secret.is_empty() && vault::compare(presented, &config.secret);

    let bytes = axum::body::to_bytes(body, config.max_body_bytes).await.ok();
    let body_ok = bytes
        .as_ref()
        .is_some_and(|b| !b.is_empty() && serde_json::from_slice::<serde_json::Value>(b).is_ok());

    if !(secret_ok && body_ok) {
        tracing::warn!(client = %client, secret_ok, body_ok, "Webhook rejected");
        return Err(GatewayError::Unauthorized);
    }

    Ok(Request::from_parts(parts, Body::from(bytes.unwrap_or_default())))
}

/// The configured prefix and action if `path` is `<prefix>/<token>`.
fn action_route<'a>(inner: &'a GatewayInner, path: &str) -> Option<(&'a str, Action)> {
    let config = &inner.config.action_tokens;
    [
        (config.approve_prefix.as_str(), Action::Approve),
        (config.reject_prefix.as_str(), Action::Reject),
    ]
    .into_iter()
    .find(|(prefix, _)| {
        path.strip_prefix(prefix.to_ascii_lowercase().as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|token| !token.is_empty() && !token.contains('/'))
    })
}

/// Last non-empty segment of the raw path, case preserved.
fn last_segment(raw_path: &str) -> Option<String> {
    let segment = raw_path.rsplit('/').find(|s| !s.is_empty())?;
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// Header first, then query string, then an urlencoded form body.
async fn extract_csrf_token(
    inner: &GatewayInner,
    request: Request<Body>,
) -> Result<(Request<Body>, Option<String>), GatewayError> {
    let config = &inner.config.csrf;

    if let Some(token) = request
        .headers()
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
    {
        let token = token.to_string();
        return Ok((request, Some(token)));
    }

    if let Some(token) = request
        .uri()
        .query()
        .and_then(|q| form_field(q.as_bytes(), &config.form_field))
    {
        return Ok((request, Some(token)));
    }

    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes: Bytes = axum::body::to_bytes(body, config.max_form_bytes)
        .await
        .map_err(|_| GatewayError::BadRequest)?;
    let token = form_field(&bytes, &config.form_field);
    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

fn form_field(input: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; gatekeeper_session=abc ; other=1"),
        );
        assert_eq!(session_cookie(&headers, "gatekeeper_session").as_deref(), Some("abc"));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    #[test]
    fn last_segment_keeps_case() {
        assert_eq!(last_segment("/approve/AbC-_9/").as_deref(), Some("AbC-_9"));
        assert_eq!(last_segment("/"), None);
    }

    #[test]
    fn safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::HEAD));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::DELETE));
    }

    #[test]
    fn form_fields_decode() {
        assert_eq!(
            form_field(b"a=1&csrf_token=x%2By", "csrf_token").as_deref(),
            Some("x+y")
        );
        assert_eq!(form_field(b"a=1", "csrf_token"), None);
    }
}
