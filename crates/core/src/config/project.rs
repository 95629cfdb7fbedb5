use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Optional `tidy.yaml` project file.
///
/// Every field is optional; values present here override built-in defaults
/// and are in turn overridden by environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub environment: Option<String>,
    pub database: DatabaseSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Name of the environment variable holding the connection URL
    pub url_env: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub migrations_table: Option<String>,
    pub version_width: Option<usize>,
    pub strict_checksums: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileSystemError {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise return `None`
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("tidy.yaml")
    }
}
