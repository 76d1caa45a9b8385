//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, CLI or `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_FILTER: &str = "gatekeeper=info,tower_http=info";

/// Build the filter directive for a bare level such as `debug`.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        DEFAULT_FILTER.to_string()
    } else if level.contains('=') {
        level.to_string()
    } else {
        format!("gatekeeper={level},tower_http={level}")
    }
}

/// Install the global subscriber.
pub fn init_logging(level: &str, json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_expand_to_crate_directives() {
        assert_eq!(filter_directive("debug"), "gatekeeper=debug,tower_http=debug");
        assert_eq!(filter_directive(""), DEFAULT_FILTER);
        assert_eq!(filter_directive("gatekeeper=trace"), "gatekeeper=trace");
    }
}
