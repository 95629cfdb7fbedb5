//! Error types for the database layer and the migration system
//!
//! `OrmError` describes failures of the backend itself (connecting, running a
//! query, committing). `MigrationError` is the migration taxonomy surfaced to
//! operators; every variant names the offending version or path.

use std::fmt;
use thiserror::Error;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// Migration result type alias
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrmError {
    /// Connection or pool error
    Connection(String),
    /// Query execution error
    Query(String),
    /// Transaction begin/commit/rollback error
    Transaction(String),
    /// A column could not be read or converted
    Decode(String),
    /// Configuration error
    Configuration(String),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            OrmError::Query(msg) => write!(f, "Query error: {}", msg),
            OrmError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            OrmError::Decode(msg) => write!(f, "Decode error: {}", msg),
            OrmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                OrmError::Connection(err.to_string())
            }
            sqlx::Error::ColumnNotFound(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                OrmError::Decode(err.to_string())
            }
            other => OrmError::Query(other.to_string()),
        }
    }
}

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The database cannot be reached at all
    #[error("Cannot connect to database: {0}")]
    Connectivity(String),

    /// The ledger table cannot be created
    #[error("Failed to create migration ledger table '{table}': {message}")]
    SchemaBootstrap { table: String, message: String },

    /// A migration file is malformed, unreadable or ambiguous
    #[error("Invalid migration definition: {0}")]
    InvalidDefinition(String),

    /// A forward or rollback script failed; its transaction was rolled back
    #[error("Migration {version} ({name}) failed: {message}")]
    Execution {
        version: String,
        name: String,
        message: String,
    },

    /// Rollback requested for a migration without a rollback script
    #[error("Migration {version} ({name}) has no rollback script")]
    MissingRollbackScript { version: String, name: String },

    /// A version was referenced that is not present where expected
    #[error("Unknown migration version {version}: {reason}")]
    UnknownVersion { version: String, reason: String },

    /// The ledger already holds a row for this version
    #[error("Migration {0} is already recorded in the ledger")]
    DuplicateVersion(String),

    /// An applied script changed on disk (strict checksum mode only)
    #[error("Checksum mismatch for applied migration {version} ({name}): recorded {recorded}, on disk {current}")]
    ChecksumMismatch {
        version: String,
        name: String,
        recorded: String,
        current: String,
    },

    /// Ledger read or transaction plumbing failure
    #[error("Database error: {0}")]
    Database(#[from] OrmError),
}

impl MigrationError {
    pub fn unknown_version(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnknownVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure happened before any migration could be attempted
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            MigrationError::Connectivity(_)
                | MigrationError::SchemaBootstrap { .. }
                | MigrationError::InvalidDefinition(_)
        )
    }
}
