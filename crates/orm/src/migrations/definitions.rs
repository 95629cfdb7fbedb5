//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system:
//! versions, on-disk definitions, ledger rows, configuration and the results
//! reported back by the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::error::MigrationError;

/// Version prefix of a migration file, e.g. `001`.
///
/// Ordered numerically: a shorter digit string sorts before a longer one,
/// equal lengths compare lexically. For fixed-width prefixes this matches
/// plain string order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationVersion(String);

impl MigrationVersion {
    /// Parse a version string; only ASCII digits are accepted
    pub fn parse(raw: &str) -> Result<Self, MigrationError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MigrationError::InvalidDefinition(format!(
                "'{}' is not a numeric migration version",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits in the version prefix
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Numeric value with leading zeros ignored
    pub fn numeric_value(&self) -> Option<u128> {
        self.0.parse().ok()
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.trim_start_matches('0');
        let b = other.0.trim_start_matches('0');
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            .then_with(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MigrationVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase hex SHA-256 of the exact script bytes
pub fn compute_checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// A migration discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    pub version: MigrationVersion,
    /// Descriptive slug from the filename, e.g. `create_todos_table`
    pub name: String,
    /// SQL applied by `migrate`
    pub forward_script: String,
    /// Checksum of `forward_script`
    pub checksum: String,
    /// SQL applied by `rollback`, when a `_rollback` file exists
    pub rollback_script: Option<String>,
    pub path: PathBuf,
    pub rollback_path: Option<PathBuf>,
}

impl MigrationDefinition {
    pub fn has_rollback(&self) -> bool {
        self.rollback_script.is_some()
    }
}

/// A row of the migration ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: MigrationVersion,
    pub name: String,
    /// When the applying transaction committed
    pub executed_at: DateTime<Utc>,
    /// Checksum of the script at the time it was applied
    pub checksum: String,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// Required number of digits in a version prefix
    pub version_width: usize,
    /// Abort `migrate` when an applied script no longer matches its checksum
    pub strict_checksums: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "tidy_migrations".to_string(),
            version_width: 3,
            strict_checksums: false,
        }
    }
}

/// An applied migration whose file changed after it ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumDrift {
    pub version: MigrationVersion,
    pub name: String,
    pub recorded: String,
    pub current: String,
}

/// Result of running migrations
#[derive(Debug, Default)]
pub struct MigrationRunResult {
    /// Versions applied by this run, in order
    pub applied_migrations: Vec<MigrationVersion>,
    /// Number of migrations that were already applied
    pub skipped_count: usize,
    /// Applied migrations whose files changed since
    pub drifted: Vec<ChecksumDrift>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back a migration
#[derive(Debug, Default)]
pub struct RollbackResult {
    /// The ledger row that was removed; `None` when the ledger was empty
    pub rolled_back: Option<LedgerEntry>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// File exists, no ledger row
    Pending,
    /// Ledger row present
    Executed {
        executed_at: DateTime<Utc>,
        /// False when the file changed after it was applied
        checksum_matches: bool,
    },
}

impl MigrationState {
    pub fn is_executed(&self) -> bool {
        matches!(self, MigrationState::Executed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MigrationState::Pending => "PENDING",
            MigrationState::Executed { .. } => "EXECUTED",
        }
    }
}

/// Status of one migration, in registry order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub version: MigrationVersion,
    pub name: String,
    #[serde(flatten)]
    pub state: MigrationState,
}

/// Reconciliation of the registry against the ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub migrations: Vec<MigrationStatusEntry>,
    /// Ledger rows whose migration file no longer exists
    pub orphaned: Vec<LedgerEntry>,
}

impl StatusReport {
    pub fn pending_count(&self) -> usize {
        self.migrations
            .iter()
            .filter(|m| m.state == MigrationState::Pending)
            .count()
    }

    pub fn executed_count(&self) -> usize {
        self.migrations.iter().filter(|m| m.state.is_executed()).count()
    }

    pub fn drifted(&self) -> impl Iterator<Item = &MigrationStatusEntry> {
        self.migrations.iter().filter(|m| {
            matches!(
                m.state,
                MigrationState::Executed {
                    checksum_matches: false,
                    ..
                }
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> MigrationVersion {
        MigrationVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_version_parse_rejects_non_digits() {
        assert!(MigrationVersion::parse("001").is_ok());
        assert!(MigrationVersion::parse("").is_err());
        assert!(MigrationVersion::parse("01a").is_err());
        assert!(MigrationVersion::parse("-01").is_err());
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        assert!(v("002") > v("001"));
        assert!(v("010") > v("009"));
        assert!(v("10") > v("9"));
        assert!(v("100") > v("099"));
        assert_eq!(v("007").numeric_value(), Some(7));

        let mut versions = vec![v("010"), v("000"), v("002"), v("001")];
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["000", "001", "002", "010"]);
    }

    #[test]
    fn test_checksum_is_stable_and_sensitive() {
        let script = b"CREATE TABLE todos (id SERIAL PRIMARY KEY);\n";
        assert_eq!(compute_checksum(script), compute_checksum(script));
        assert_eq!(compute_checksum(script).len(), 64);

        let mut changed = script.to_vec();
        changed[0] = b'c';
        assert_ne!(compute_checksum(script), compute_checksum(&changed));

        let mut trailing = script.to_vec();
        trailing.push(b' ');
        assert_ne!(compute_checksum(script), compute_checksum(&trailing));
    }

    #[test]
    fn test_status_entry_serializes_flat() {
        let entry = MigrationStatusEntry {
            version: v("001"),
            name: "create_todos_table".into(),
            state: MigrationState::Pending,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "PENDING");
        assert_eq!(json["version"], "001");

        let executed = MigrationStatusEntry {
            state: MigrationState::Executed {
                executed_at: Utc::now(),
                checksum_matches: false,
            },
            ..entry
        };
        let json = serde_json::to_value(&executed).unwrap();
        assert_eq!(json["state"], "EXECUTED");
        assert_eq!(json["checksum_matches"], false);
    }
}
