//! Gatekeeper: the request gating layer for an audiobook-request approval
//! service.
//!
//! Every inbound request is classified, rate limited and authenticated
//! before it reaches an application handler. State-changing approve/reject
//! submissions additionally need a single-use CSRF token and a single-use
//! action token.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{GatewayState, HttpServer};
pub use lifecycle::Shutdown;
