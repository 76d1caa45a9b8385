//! Security response headers.
//!
//! # Responsibilities
//! - Define the headers stamped on every response
//! - Add `Strict-Transport-Security` when the request arrived over HTTPS
//!
//! # Design Decisions
//! - Static headers are applied by `SetResponseHeaderLayer` outside the
//!   gateway, so rejections carry them too
//! - HSTS depends on the effective scheme, which only the gateway knows

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Policy for a service that serves JSON and minimal server-rendered forms.
pub const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; style-src 'self'; form-action 'self'; frame-ancestors 'none'; base-uri 'none'";

/// Headers present on every response.
pub fn static_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
    ]
}

/// `Strict-Transport-Security` value for `max_age_secs`.
pub fn hsts_value(max_age_secs: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("max-age={max_age_secs}; includeSubDomains"))
        .unwrap_or_else(|_| HeaderValue::from_static("max-age=31536000; includeSubDomains"))
}

/// Add HSTS to a secure response.
pub fn apply_hsts(headers: &mut HeaderMap, max_age_secs: u64) {
    headers.insert(header::STRICT_TRANSPORT_SECURITY, hsts_value(max_age_secs));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_set_is_complete() {
        let names: Vec<_> = static_headers().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&header::X_CONTENT_TYPE_OPTIONS));
        assert!(names.contains(&header::X_FRAME_OPTIONS));
        assert!(names.contains(&header::X_XSS_PROTECTION));
        assert!(names.contains(&header::REFERRER_POLICY));
        assert!(names.contains(&header::CONTENT_SECURITY_POLICY));
        assert!(!names.contains(&header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn hsts_uses_configured_age() {
        let mut headers = HeaderMap::new();
        apply_hsts(&mut headers, 31_536_000);
        assert_eq!(
            headers[header::STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains"
        );
    }
}
