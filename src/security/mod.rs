//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (driven by http::gateway):
//!     → client_ip.rs (resolve identity behind trusted proxies)
//!     → transport.rs (HTTPS redirect decision)
//!     → classifier.rs (Protected / Public / Webhook)
//!     → rate_limit.rs (token bucket per identity and scope)
//!     → vault.rs + session.rs (API key, session or webhook secret)
//!     → csrf.rs + action_token.rs (approve/reject submissions)
//!     → headers.rs (response hardening)
//! ```
//!
//! # Design Decisions
//! - Anything that cannot be parsed or normalized is treated as protected
//! - Secrets are compared in constant time and never logged
//! - Each component is usable on its own; only the gateway knows the order

pub mod action_token;
pub mod api_key;
pub mod classifier;
pub mod client_ip;
pub mod csrf;
pub mod headers;
pub mod rate_limit;
pub mod session;
pub mod transport;
pub mod vault;
