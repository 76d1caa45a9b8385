//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, apply env secrets)
//!     → validation.rs (semantic checks, all errors at once)
//!     → GatewayConfig (validated, immutable)
//!     → passed by reference into each component constructor
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → only the API key is swapped in; everything else needs a restart
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; components never read globals
//! - Every field has a default; an empty file only needs an API key
//!   (file or environment) to pass validation
//! - Secrets may come from the environment instead of the file

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::GatewayConfig;
pub use validation::{validate_config, ValidationError};
