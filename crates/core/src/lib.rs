//! # tidy-core
//!
//! Configuration and logging shared by the tidy crates.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigSource, Environment, ProjectConfig};
pub use logging::{init_logging, LogFormat, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
