//! Gateway boundary errors.
//!
//! Every internal check failure is folded into exactly one [`GatewayError`]
//! before it leaves the middleware chain. The response body carries only the
//! kind; details stay in the logs.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Rejection kinds visible to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Credential present but the action is refused (CSRF failure).
    #[error("forbidden")]
    Forbidden,

    /// Rate limit exceeded; `retry_after_secs` is rounded up.
    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    /// Hidden or nonexistent path.
    #[error("not found")]
    NotFound,

    /// Malformed input.
    #[error("bad request")]
    BadRequest,

    /// Persistent internal failure.
    #[error("service unavailable")]
    Unavailable,
}

impl GatewayError {
    /// HTTP status for this kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable short label used in bodies and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status_code(),
            Json(ErrorBody {
                error: self.label(),
            }),
        )
            .into_response();

        if let Self::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
