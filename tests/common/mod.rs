//! Shared fixtures for the gateway integration tests.
#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use gatekeeper::clock::ManualClock;
use gatekeeper::config::GatewayConfig;
use gatekeeper::http::server::build_router;
use gatekeeper::store::MemoryActionTokenStore;
use gatekeeper::GatewayState;
use tower::ServiceExt;

pub const API_KEY: &str = "k3y-for-tests-0123456789abcdefghijklmnop";
pub const WEBHOOK_SECRET: &str = "autobrr-shared-secret";

/// Configuration with known secrets and no metrics exporter.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.api_key = API_KEY.to_string();
    config.webhook.secret = WEBHOOK_SECRET.to_string();
    config.observability.metrics_enabled = false;
    config
}

/// A gateway wired to a manual clock.
pub struct Harness {
    pub state: GatewayState,
    pub router: Router,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryActionTokenStore::new(
            config.action_tokens.revoke_siblings,
            None,
        ));
        let state = GatewayState::new(config, store, clock.clone());
        let router = build_router(state.clone());
        Self { state, router, clock }
    }

    /// Drive one request through the full middleware stack as if it came
    /// from `peer`.
    pub async fn send(&self, peer: &str, mut request: Request<Body>) -> Response<Body> {
        let ip: IpAddr = peer.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40000)));
        self.router.clone().oneshot(request).await.unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(test_config())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap()
        .to_vec()
}

/// Post a webhook for `request_id` and return the issued links.
pub async fn register(harness: &Harness, peer: &str, request_id: &str) -> serde_json::Value {
    let request = Request::post("/webhook/autobrr")
        .header("content-type", "application/json")
        .header("x-autobrr-token", WEBHOOK_SECRET)
        .body(Body::from(format!(r#"{{"request_id":"{request_id}","name":"Dune"}}"#)))
        .unwrap();
    let response = harness.send(peer, request).await;
    assert_eq!(response.status(), 201);
    body_json(response).await
}

/// Fetch a CSRF token for an action URL.
pub async fn confirm(harness: &Harness, peer: &str, url: &str) -> String {
    let response = harness.send(peer, get(url)).await;
    assert_eq!(response.status(), 200);
    body_json(response).await["csrf_token"]
        .as_str()
        .unwrap()
        .to_string()
}

pub fn post_with_csrf(url: &str, csrf: &str) -> Request<Body> {
    Request::post(url)
        .header("x-csrf-token", csrf)
        .body(Body::empty())
        .unwrap()
}
