//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON when requested)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - JSON output is opt-in at startup
//! - Metric calls are no-ops until a recorder is installed
//! - Secrets never appear in logs or labels; only kinds and outcomes do

pub mod logging;
pub mod metrics;
