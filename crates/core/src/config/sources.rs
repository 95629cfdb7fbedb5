/// Where a configuration value came from, for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default(String),
    /// Value loaded from the project file
    File(String),
    /// Value provided programmatically (e.g. a CLI flag)
    Programmatic,
}

impl ConfigSource {
    /// Check if source is environment variable
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    /// Check if source is default value
    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    /// Check if source is from file
    pub fn is_file(&self) -> bool {
        matches!(self, ConfigSource::File(_))
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "Environment variable: {}", var),
            ConfigSource::Default(value) => write!(f, "Default value: {}", value),
            ConfigSource::File(path) => write!(f, "Configuration file: {}", path),
            ConfigSource::Programmatic => write!(f, "Programmatically set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_origin() {
        assert_eq!(
            ConfigSource::EnvVar("DATABASE_URL".into()).to_string(),
            "Environment variable: DATABASE_URL"
        );
        assert_eq!(
            ConfigSource::File("tidy.yaml".into()).to_string(),
            "Configuration file: tidy.yaml"
        );
        assert!(ConfigSource::Default("info".into()).is_default());
    }
}
