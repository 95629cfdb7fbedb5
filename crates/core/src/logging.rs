//! # Structured Logging
//!
//! Logging setup shared by the tidy binaries: `tracing` events rendered by a
//! `tracing-subscriber` fmt layer, filtered through `EnvFilter`.

use crate::config::{AppConfig, ConfigError, ConfigSource};
use std::io;
use std::str::FromStr;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// One JSON object per event
    Json,
    /// Compact single-line text
    Plain,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "plain" | "text" | "compact" => Ok(LogFormat::Plain),
            _ => Err(ConfigError::invalid_value(
                "log_format",
                s,
                "pretty, json, or plain",
            )),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    pub format: LogFormat,
    /// Include file and line number information
    pub include_location: bool,
    /// Environment filter (supports directives like "tidy_orm=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Production logging: JSON lines, driver chatter suppressed
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: false,
            env_filter: Some("info,sqlx=warn".to_string()),
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            format: LogFormat::Plain,
            include_location: false,
            env_filter: None,
        }
    }

    /// Derive logging settings from the application configuration.
    ///
    /// In production the format falls back to the [`LoggingConfig::production`]
    /// preset unless one was configured explicitly.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let production = config.environment.is_production();
        let format_is_default = config
            .config_sources()
            .get("log_format")
            .map_or(true, ConfigSource::is_default);
        let verbose = matches!(config.log_level.as_str(), "debug" | "trace");

        Self {
            level: config.log_level.clone(),
            format: if production && format_is_default {
                Self::production().format
            } else {
                config.log_format
            },
            include_location: verbose && !production,
            // sqlx logs every statement at info; keep it quiet unless asked
            env_filter: Some(format!("{},sqlx=warn", config.log_level)),
        }
    }

    fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize logging for the process.
///
/// `RUST_LOG` takes precedence over the configured filter. Logs go to stderr
/// so command output on stdout stays machine readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    let layer = Layer::new()
        .with_writer(io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init()?,
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init()?,
    }

    tracing::debug!(
        target: "tidy::logging",
        "Logging initialized (level: {}, format: {:?})",
        config.level,
        config.format
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Plain);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::new();
        app.log_level = "debug".to_string();
        app.log_format = LogFormat::Json;

        let logging = LoggingConfig::from_app_config(&app);
        assert_eq!(logging.format, LogFormat::Json);
        assert!(logging.include_location);
        assert_eq!(logging.filter_directive(), "debug,sqlx=warn");
    }

    #[test]
    fn test_filter_falls_back_to_level() {
        let config = LoggingConfig::test();
        assert_eq!(config.filter_directive(), "error");
        assert_eq!(LoggingConfig::production().filter_directive(), "info,sqlx=warn");
    }

    #[test]
    fn test_production_defaults_to_json() {
        let mut app = AppConfig::new();
        app.environment = Environment::Production;
        app.log_level = "debug".to_string();

        let logging = LoggingConfig::from_app_config(&app);
        assert_eq!(logging.format, LogFormat::Json);
        assert!(!logging.include_location);

        app.apply_env(|key| (key == "LOG_FORMAT").then(|| "plain".to_string()))
            .unwrap();
        let logging = LoggingConfig::from_app_config(&app);
        assert_eq!(logging.format, LogFormat::Plain);
    }
}
