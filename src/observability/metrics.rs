//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_requests_total` (counter): requests by endpoint kind and outcome
//! - `gatekeeper_rate_limited_total` (counter): rejections by limiter scope
//! - `gatekeeper_csrf_rejections_total` (counter): CSRF failures by reason
//! - `gatekeeper_action_token_redemptions_total` (counter): redemptions by outcome
//! - `gatekeeper_evicted_entries_total` (counter): sweep evictions by store
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Label values are fixed vocabularies, never client input

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a gateway decision.
pub fn record_request(kind: &'static str, outcome: &'static str) {
    metrics::counter!("gatekeeper_requests_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

/// Count a rate limit rejection.
pub fn record_rate_limited(scope: &str) {
    metrics::counter!("gatekeeper_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

/// Count a CSRF rejection.
pub fn record_csrf_rejection(reason: &'static str) {
    metrics::counter!("gatekeeper_csrf_rejections_total", "reason" => reason).increment(1);
}

/// Count an action token redemption attempt.
pub fn record_redemption(outcome: &'static str) {
    metrics::counter!("gatekeeper_action_token_redemptions_total", "outcome" => outcome)
        .increment(1);
}

/// Count entries removed by a maintenance sweep.
pub fn record_evicted(store: &'static str, count: usize) {
    metrics::counter!("gatekeeper_evicted_entries_total", "store" => store).increment(count as u64);
}
