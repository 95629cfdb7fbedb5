use crate::config::{
    validate_log_level, validate_table_name, ConfigError, ConfigSource, ProjectConfig,
};
use crate::logging::LogFormat;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_MIGRATIONS_TABLE: &str = "tidy_migrations";
pub const DEFAULT_VERSION_WIDTH: usize = 3;

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::invalid_value(
                "environment",
                s,
                "development, testing, or production",
            )),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Runtime configuration for the migration tooling
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// Name of the environment variable the database URL is read from
    pub database_url_env: String,
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub migrations_table: String,
    /// Number of digits in a migration version prefix
    pub version_width: usize,
    /// Refuse to migrate when an applied script changed on disk
    pub strict_checksums: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    sources: HashMap<String, ConfigSource>,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        let mut config = Self {
            environment: Environment::Development,
            database_url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
            database_url: None,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            version_width: DEFAULT_VERSION_WIDTH,
            strict_checksums: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            sources: HashMap::new(),
        };

        for (field, value) in [
            ("environment", "development".to_string()),
            ("migrations_dir", DEFAULT_MIGRATIONS_DIR.to_string()),
            ("migrations_table", DEFAULT_MIGRATIONS_TABLE.to_string()),
            ("version_width", DEFAULT_VERSION_WIDTH.to_string()),
            ("strict_checksums", "false".to_string()),
            ("log_level", "info".to_string()),
            ("log_format", "pretty".to_string()),
        ] {
            config
                .sources
                .insert(field.to_string(), ConfigSource::Default(value));
        }

        config
    }

    /// Load configuration from defaults, an optional project file and the
    /// process environment, in that order of precedence.
    ///
    /// An explicitly named project file must exist; otherwise `tidy.yaml` in
    /// the working directory is used when present.
    pub fn load(project_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        let project = match project_file {
            Some(path) => Some((ProjectConfig::load(path)?, path.to_path_buf())),
            None => {
                let path = ProjectConfig::default_path();
                ProjectConfig::load_optional(&path)?.map(|project| (project, path))
            }
        };

        if let Some((project, path)) = project {
            config.merge_project(&project, &path.display().to_string())?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a parsed project file
    pub fn merge_project(&mut self, project: &ProjectConfig, origin: &str) -> Result<(), ConfigError> {
        let source = || ConfigSource::File(origin.to_string());

        if let Some(environment) = &project.environment {
            self.environment = environment.parse()?;
            self.sources.insert("environment".into(), source());
        }
        if let Some(url_env) = &project.database.url_env {
            self.database_url_env = url_env.clone();
            self.sources.insert("database_url_env".into(), source());
        }
        if let Some(dir) = &project.database.migrations_dir {
            self.migrations_dir = dir.clone();
            self.sources.insert("migrations_dir".into(), source());
        }
        if let Some(table) = &project.database.migrations_table {
            self.migrations_table = table.clone();
            self.sources.insert("migrations_table".into(), source());
        }
        if let Some(width) = project.database.version_width {
            self.version_width = width;
            self.sources.insert("version_width".into(), source());
        }
        if let Some(strict) = project.database.strict_checksums {
            self.strict_checksums = strict;
            self.sources.insert("strict_checksums".into(), source());
        }
        if let Some(level) = &project.logging.level {
            self.log_level = level.to_lowercase();
            self.sources.insert("log_level".into(), source());
        }
        if let Some(format) = &project.logging.format {
            self.log_format = format.parse()?;
            self.sources.insert("log_format".into(), source());
        }

        Ok(())
    }

    /// Overlay values from environment variables using `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env_str) = lookup("TIDY_ENV") {
            self.environment = env_str.parse()?;
            self.sources
                .insert("environment".into(), ConfigSource::EnvVar("TIDY_ENV".into()));
        }

        if let Some(url) = lookup(&self.database_url_env) {
            self.database_url = Some(url);
            self.sources.insert(
                "database_url".into(),
                ConfigSource::EnvVar(self.database_url_env.clone()),
            );
        }

        if let Some(dir) = lookup("MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
            self.sources
                .insert("migrations_dir".into(), ConfigSource::EnvVar("MIGRATIONS_DIR".into()));
        }

        if let Some(table) = lookup("MIGRATIONS_TABLE") {
            self.migrations_table = table;
            self.sources.insert(
                "migrations_table".into(),
                ConfigSource::EnvVar("MIGRATIONS_TABLE".into()),
            );
        }

        if let Some(width) = lookup("MIGRATIONS_VERSION_WIDTH") {
            self.version_width = width.parse().map_err(|_| {
                ConfigError::invalid_value("version_width", width.clone(), "a positive integer")
            })?;
            self.sources.insert(
                "version_width".into(),
                ConfigSource::EnvVar("MIGRATIONS_VERSION_WIDTH".into()),
            );
        }

        if let Some(strict) = lookup("MIGRATIONS_STRICT_CHECKSUMS") {
            self.strict_checksums = parse_bool("strict_checksums", &strict)?;
            self.sources.insert(
                "strict_checksums".into(),
                ConfigSource::EnvVar("MIGRATIONS_STRICT_CHECKSUMS".into()),
            );
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            self.log_level = log_level.to_lowercase();
            self.sources
                .insert("log_level".into(), ConfigSource::EnvVar("LOG_LEVEL".into()));
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = format.parse()?;
            self.sources
                .insert("log_format".into(), ConfigSource::EnvVar("LOG_FORMAT".into()));
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_log_level(&self.log_level)?;
        validate_table_name(&self.migrations_table)?;

        if self.version_width == 0 || self.version_width > 32 {
            return Err(ConfigError::invalid_value(
                "version_width",
                self.version_width.to_string(),
                "a width between 1 and 32 digits",
            ));
        }

        Ok(())
    }

    /// Database URL, or an error naming the variable that should hold it
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or_else(|| {
            ConfigError::missing(
                "database_url",
                format!(
                    "Set the {} environment variable or pass --database-url",
                    self.database_url_env
                ),
            )
        })
    }

    pub fn set_database_url(&mut self, url: impl Into<String>) {
        self.database_url = Some(url.into());
        self.sources
            .insert("database_url".into(), ConfigSource::Programmatic);
    }

    pub fn set_migrations_dir(&mut self, dir: impl Into<PathBuf>) {
        self.migrations_dir = dir.into();
        self.sources
            .insert("migrations_dir".into(), ConfigSource::Programmatic);
    }

    pub fn set_log_level(&mut self, level: impl Into<String>) -> Result<(), ConfigError> {
        let level = level.into().to_lowercase();
        validate_log_level(&level)?;
        self.log_level = level;
        self.sources
            .insert("log_level".into(), ConfigSource::Programmatic);
        Ok(())
    }

    /// Get configuration source information for debugging
    pub fn config_sources(&self) -> &HashMap<String, ConfigSource> {
        &self.sources
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(field, value, "true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::new();
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.migrations_table, "tidy_migrations");
        assert_eq!(config.version_width, 3);
        assert!(!config.strict_checksums);
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
        assert!(config.config_sources()["migrations_dir"].is_default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::new();
        config
            .apply_env(lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/tidy"),
                ("MIGRATIONS_DIR", "db/migrations"),
                ("MIGRATIONS_STRICT_CHECKSUMS", "yes"),
                ("LOG_LEVEL", "DEBUG"),
                ("LOG_FORMAT", "json"),
            ]))
            .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/tidy"));
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert!(config.strict_checksums);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.config_sources()["database_url"].is_env_var());
    }

    #[test]
    fn test_project_file_then_env_precedence() {
        let project: ProjectConfig = serde_yaml::from_str(
            "database:\n  url_env: TODO_DATABASE_URL\n  migrations_table: todo_ledger\n  version_width: 4\n",
        )
        .unwrap();

        let mut config = AppConfig::new();
        config.merge_project(&project, "tidy.yaml").unwrap();
        config
            .apply_env(lookup_from(&[
                ("TODO_DATABASE_URL", "sqlite://todo.db"),
                ("MIGRATIONS_TABLE", "env_ledger"),
            ]))
            .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite://todo.db"));
        assert_eq!(config.migrations_table, "env_ledger");
        assert_eq!(config.version_width, 4);
        assert!(config.config_sources()["version_width"].is_file());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::new();
        let result = config.apply_env(lookup_from(&[("MIGRATIONS_VERSION_WIDTH", "three")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let mut config = AppConfig::new();
        config.version_width = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::new();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_database_url_names_variable() {
        let config = AppConfig::new();
        let err = config.require_database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn test_from_process_env() {
        env::set_var("MIGRATIONS_TABLE", "serial_ledger");
        env::set_var("TIDY_ENV", "production");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.migrations_table, "serial_ledger");
        assert!(config.environment.is_production());

        env::remove_var("MIGRATIONS_TABLE");
        env::remove_var("TIDY_ENV");
    }

    #[test]
    #[serial]
    fn test_load_with_explicit_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "logging:\n  level: warn\n  format: plain\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_format, LogFormat::Plain);

        let missing = AppConfig::load(Some(&dir.path().join("absent.yaml")));
        assert!(matches!(missing, Err(ConfigError::FileSystemError { .. })));
    }
}
