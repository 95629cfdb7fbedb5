use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("File system error: {message}")]
    FileSystemError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn missing(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }
}

/// Log levels accepted by `LOG_LEVEL` and the `--log-level` flag
pub const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Validate a log level string
pub fn validate_log_level(level: &str) -> Result<(), ConfigError> {
    if VALID_LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            "log_level",
            level,
            format!("one of: {}", VALID_LOG_LEVELS.join(", ")),
        ))
    }
}

/// Longest identifier PostgreSQL accepts without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` is a plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, at
/// most [`MAX_IDENTIFIER_LEN`] bytes
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    starts_ok && name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate that a ledger table name is a plain SQL identifier.
///
/// The table name is interpolated into DDL.
pub fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    if is_plain_identifier(table) {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            "migrations_table",
            table,
            format!(
                "an identifier of letters, digits and underscores (max {} chars)",
                MAX_IDENTIFIER_LEN
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_validation() {
        assert!(validate_log_level("debug").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("tidy_migrations").is_ok());
        assert!(validate_table_name("_ledger2").is_ok());
        assert!(validate_table_name("2ledger").is_err());
        assert!(validate_table_name("ledger; DROP TABLE todos").is_err());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name(&"t".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(validate_table_name(&"t".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }
}
