//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout, security headers)
//!     → gateway.rs (identity, transport, classification, limits, credentials)
//!     → handlers.rs (application routes)
//!     → Send to client
//! ```

pub mod gateway;
pub mod handlers;
pub mod server;

pub use gateway::{ActionGrant, Credential, GatewayState, RequestContext};
pub use server::HttpServer;
