//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build gateway state → Spawn maintenance → Serve
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM → Stop accepting → Drain connections → Stop maintenance
//!     → Save action token snapshot → Exit
//!
//! Maintenance (maintenance.rs):
//!     Every sweep interval → evict idle/expired state
//! ```

pub mod maintenance;
pub mod shutdown;

pub use shutdown::Shutdown;
