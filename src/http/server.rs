//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (gateway, security headers, tracing, request ID, timeout)
//! - Bind server to listener and serve until shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::gateway::{gateway_middleware, GatewayState};
use crate::http::handlers;
use crate::security::headers;

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around prepared gateway state.
    pub fn new(state: GatewayState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// The fully layered router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// Layers wrap from the bottom up: the security headers are outermost so
/// that redirects and rejections produced by the gateway carry them too.
#[allow(deprecated)]
pub fn build_router(state: GatewayState) -> Router {
    let config = &state.inner.config;
    let approve = format!("{}/{{token}}", config.action_tokens.approve_prefix);
    let reject = format!("{}/{{token}}", config.action_tokens.reject_prefix);
    let timeout = Duration::from_secs(config.timeouts.request_secs);

    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/webhook/autobrr", post(handlers::webhook))
        .route(&approve, get(handlers::confirm).post(handlers::decide))
        .route(&reject, get(handlers::confirm).post(handlers::decide))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), gateway_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    for (name, value) in headers::static_headers() {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }
    router
}
