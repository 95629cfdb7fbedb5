//! Database Backend Abstractions
//!
//! This module provides database backend abstractions so the migration
//! system can run against PostgreSQL and SQLite through common traits.

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

// Re-export core traits and types
pub use self::core::*;
pub use postgres::PostgresPool;
pub use sqlite::SqlitePool;

use crate::error::{OrmError, OrmResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Pick the backend from a connection URL scheme
    pub fn from_url(url: &str) -> OrmResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(DatabaseBackendType::PostgreSQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(OrmError::Configuration(format!(
                "Unsupported database URL scheme '{}': expected postgres:// or sqlite:",
                scheme
            ))),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL => SqlDialect::PostgreSQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Connect to the database named by `database_url` and return a shared pool
pub async fn connect(database_url: &str, config: &PoolConfig) -> OrmResult<Arc<dyn DatabasePool>> {
    let backend = DatabaseBackendType::from_url(database_url)?;
    tracing::debug!("Connecting to {} database", backend);

    let pool: Arc<dyn DatabasePool> = match backend {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresPool::connect(database_url, config).await?),
        DatabaseBackendType::SQLite => Arc::new(SqlitePool::connect(database_url, config).await?),
    };

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            DatabaseBackendType::from_url("postgres://localhost/tidy").unwrap(),
            DatabaseBackendType::PostgreSQL
        );
        assert_eq!(
            DatabaseBackendType::from_url("sqlite://todo.db").unwrap(),
            DatabaseBackendType::SQLite
        );
        assert_eq!(
            DatabaseBackendType::from_url("sqlite::memory:").unwrap(),
            DatabaseBackendType::SQLite
        );
        assert!(DatabaseBackendType::from_url("mysql://localhost/tidy").is_err());
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let pool = connect("sqlite::memory:", &PoolConfig::default()).await.unwrap();
        assert_eq!(pool.backend_type(), DatabaseBackendType::SQLite);
        assert!(pool.health_check().await.is_ok());
        assert_eq!(pool.stats().total_connections, 1);

        let rows = pool
            .fetch_all("SELECT 1 AS one, 'two' AS two, NULL AS three", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].column_count(), 3);
        assert_eq!(rows[0].get_by_name("one").unwrap(), DatabaseValue::Int64(1));
        assert_eq!(rows[0].get_string("two").unwrap(), "two");
        assert!(rows[0].get_by_name("three").unwrap().is_null());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_postgres_url() {
        let result = connect("postgres://", &PoolConfig::default()).await;
        assert!(matches!(result, Err(OrmError::Connection(_))));
    }
}
