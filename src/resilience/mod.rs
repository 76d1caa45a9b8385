//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call into the action token store:
//!     → retries.rs (retry transient failures once)
//!     → backoff.rs (jittered delay between attempts)
//!     → persistent failure surfaces as a generic 503
//! ```
//!
//! # Design Decisions
//! - Only errors the caller marks transient are retried
//! - Jittered backoff prevents synchronized retries
//! - Retry budget is per call, not global

pub mod backoff;
pub mod retries;
