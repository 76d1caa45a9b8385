//! Application routes behind the gateway.
//!
//! These stand in for the approval workflow: they never re-check
//! credentials and rely on the [`RequestContext`] and [`ActionGrant`] the
//! gateway attached.

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::gateway::{session_cookie, ActionGrant, GatewayState, RequestContext};
use crate::security::transport::CookiePolicy;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "gatekeeper",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Fields read from a webhook payload. Everything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    request_id: Option<String>,
}

/// Response to a new approval request.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedLinks {
    pub subject_id: String,
    pub approve_url: String,
    pub reject_url: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /webhook/autobrr`: register a subject and mint its token pair.
pub async fn webhook(State(state): State<GatewayState>, body: Bytes) -> Result<Response, GatewayError> {
    let payload: WebhookPayload = serde_json::from_slice(&body).unwrap_or_default();
    let subject_id = payload
        .request_id
        .filter(|id| !id.trim().is_empty() && id.len() <= 128)
        .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4()));

    let pair = state
        .inner
        .action_tokens
        .issue_pair(&subject_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, subject = %subject_id, "Failed to issue action tokens");
            GatewayError::Unavailable
        })?;

    let config = &state.inner.config.action_tokens;
    let links = IssuedLinks {
        approve_url: format!("{}/{}", config.approve_prefix, pair.approve.value),
        reject_url: format!("{}/{}", config.reject_prefix, pair.reject.value),
        expires_at: pair.approve.expires_at,
        subject_id,
    };
    Ok((StatusCode::CREATED, Json(links)).into_response())
}

/// What a client needs to confirm an action.
#[derive(Debug, Serialize, Deserialize)]
pub struct Confirmation {
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

/// `GET /approve/{token}` and `GET /reject/{token}`: hand out a CSRF token
/// bound to this exact action path. The action token is not touched.
pub async fn confirm(
    State(state): State<GatewayState>,
    Extension(context): Extension<RequestContext>,
) -> Result<Json<Confirmation>, GatewayError> {
    let token = state.inner.csrf.issue(&context.path).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue CSRF token");
        GatewayError::Unavailable
    })?;
    Ok(Json(Confirmation {
        csrf_token: token.value,
        expires_at: token.expires_at,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Decided {
    pub subject_id: String,
    pub action: String,
}

/// `POST /approve/{token}` and `POST /reject/{token}`.
pub async fn decide(grant: Option<Extension<ActionGrant>>) -> Result<Json<Decided>, GatewayError> {
    let Extension(grant) = grant.ok_or(GatewayError::Unauthorized)?;
    tracing::info!(subject = %grant.subject_id, action = grant.action.as_str(), "Request decided");
    Ok(Json(Decided {
        subject_id: grant.subject_id,
        action: grant.action.as_str().to_string(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Stats {
    pub rate_limit_buckets: usize,
    pub csrf_tokens: usize,
    pub sessions: usize,
}

/// `GET /stats` (protected).
pub async fn stats(State(state): State<GatewayState>) -> Json<Stats> {
    let inner = &state.inner;
    Json(Stats {
        rate_limit_buckets: inner.limiter.len(),
        csrf_tokens: inner.csrf.len(),
        sessions: inner.sessions.len(),
    })
}

/// `POST /login`: exchange the API key for a session cookie.
pub async fn login(
    State(state): State<GatewayState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let inner = &state.inner;
    let presented = headers
        .get(inner.config.auth.api_key_header.as_str())
        .and_then(|v| v.to_str().ok());
    if !inner.api_key.verify(presented) {
        tracing::warn!(client = %context.client, "Login with invalid API key");
        return Err(GatewayError::Unauthorized);
    }

    let session = inner.sessions.issue().map_err(|e| {
        tracing::error!(error = %e, "Failed to issue session");
        GatewayError::Unavailable
    })?;
    let cookie = CookiePolicy::for_scheme(context.secure).set_cookie(
        &inner.config.auth.session_cookie,
        &session.id,
        inner.sessions.ttl().num_seconds(),
    );
    tracing::info!(client = %context.client, "Session issued");
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

/// `POST /logout`: revoke the session and clear its cookie.
pub async fn logout(
    State(state): State<GatewayState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
) -> Response {
    let inner = &state.inner;
    let name = &inner.config.auth.session_cookie;
    if let Some(id) = session_cookie(&headers, name) {
        inner.sessions.revoke(&id);
    }
    let cookie = CookiePolicy::for_scheme(context.secure).clear_cookie(name);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
}

/// Anything without a route.
pub async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
