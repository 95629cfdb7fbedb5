//! Core Database Backend Traits
//!
//! These traits are the database handle the migration system is built on.
//! They hide which sqlx driver sits underneath so the same runner works
//! against PostgreSQL in production and SQLite in development and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

use super::DatabaseBackendType;
use crate::error::{OrmError, OrmResult};

/// Abstract database transaction.
///
/// A transaction owns one pooled connection until it is committed, rolled
/// back or dropped. Dropping it without committing rolls it back and returns
/// the connection to the pool.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a SQL script of one or more statements without parameters
    async fn execute_script(&mut self, sql: &str) -> OrmResult<()>;

    /// Execute a parameterised statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return result rows within the transaction
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}

/// Abstract database connection pool
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Begin a transaction on a connection acquired from the pool
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>>;

    /// Execute a statement directly on the pool
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return result rows directly on the pool
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Close the pool
    async fn close(&self);

    /// Perform a health check on the pool
    async fn health_check(&self) -> OrmResult<Duration>;

    /// Which backend this pool talks to
    fn backend_type(&self) -> DatabaseBackendType;

    /// Get pool statistics
    fn stats(&self) -> DatabasePoolStats;
}

/// Database pool statistics
#[derive(Debug, Clone)]
pub struct DatabasePoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
}

/// Abstract database row
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column count
    fn column_count(&self) -> usize;
}

/// Typed column access on top of `DatabaseRow`
pub trait DatabaseRowExt {
    fn get_string(&self, column: &str) -> OrmResult<String>;
    fn get_datetime(&self, column: &str) -> OrmResult<DateTime<Utc>>;
}

impl<R: DatabaseRow + ?Sized> DatabaseRowExt for R {
    fn get_string(&self, column: &str) -> OrmResult<String> {
        match self.get_by_name(column)? {
            DatabaseValue::String(s) => Ok(s),
            other => Err(OrmError::Decode(format!(
                "column '{}' is not text: {:?}",
                column, other
            ))),
        }
    }

    fn get_datetime(&self, column: &str) -> OrmResult<DateTime<Utc>> {
        self.get_by_name(column)?
            .to_datetime()
            .map_err(|e| OrmError::Decode(format!("column '{}': {}", column, e)))
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Interpret the value as a UTC timestamp.
    ///
    /// SQLite stores timestamps as text, either RFC 3339 or the
    /// `CURRENT_TIMESTAMP` form `YYYY-MM-DD HH:MM:SS`.
    pub fn to_datetime(&self) -> OrmResult<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Ok(*dt),
            DatabaseValue::String(s) => parse_timestamp(s),
            other => Err(OrmError::Decode(format!("expected timestamp, found {:?}", other))),
        }
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

fn parse_timestamp(raw: &str) -> OrmResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    Err(OrmError::Decode(format!("unrecognised timestamp '{}'", raw)))
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600), // 10 minutes
            max_lifetime_seconds: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// SQL dialect differences the ledger has to care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Column type used for commit timestamps
    pub fn timestamp_type(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "TIMESTAMPTZ",
            SqlDialect::SQLite => "TEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_sqlite_current_timestamp() {
        let dt = DatabaseValue::from("2024-03-09 14:05:33").to_datetime().unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.second(), 33);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let dt = DatabaseValue::from("2024-03-09T14:05:33+02:00").to_datetime().unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_non_timestamp_values_rejected() {
        assert!(DatabaseValue::Int64(5).to_datetime().is_err());
        assert!(DatabaseValue::from("yesterday").to_datetime().is_err());
        assert!(DatabaseValue::Null.is_null());
    }
}
