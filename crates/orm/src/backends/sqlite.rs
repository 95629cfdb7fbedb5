//! SQLite Backend Implementation
//!
//! Used for local development databases and by the test suite. SQLite runs
//! DDL inside transactions, so migrations keep their all-or-nothing
//! behaviour here too.

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Pool, Row as SqlxRow, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{OrmError, OrmResult};

/// SQLite connection pool implementation
pub struct SqlitePool {
    pool: Pool<Sqlite>,
}

impl SqlitePool {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database named by `database_url`.
    ///
    /// In-memory databases live only as long as their connection, so they
    /// get a single connection that is never recycled.
    pub async fn connect(database_url: &str, config: &PoolConfig) -> OrmResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrmError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(config.acquire_timeout())
            .test_before_acquire(config.test_before_acquire);

        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        } else {
            pool_options = pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
                .max_lifetime(config.max_lifetime_seconds.map(Duration::from_secs));
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to open SQLite database: {}", e)))?;

        tracing::debug!("SQLite pool created for {}", database_url);

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DatabasePool for SqlitePool {
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(|e| OrmError::Query(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrmError::Query(format!("Query fetch failed: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(SqliteRowWrapper { row }) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn health_check(&self) -> OrmResult<Duration> {
        let start = Instant::now();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| OrmError::Connection(format!("Health check failed: {}", e)))?;

        Ok(start.elapsed())
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn stats(&self) -> DatabasePoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DatabasePoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
        }
    }
}

/// SQLite transaction holding one pooled connection
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl DatabaseTransaction for SqliteTransaction {
    async fn execute_script(&mut self, sql: &str) -> OrmResult<()> {
        (&mut *self.tx)
            .execute(sql)
            .await
            .map_err(|e| OrmError::Query(e.to_string()))?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| OrmError::Query(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| OrmError::Query(format!("Query fetch failed: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(SqliteRowWrapper { row }) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }
}

/// SQLite row wrapper.
///
/// SQLite is dynamically typed, so values are converted by the storage
/// class of the value actually stored rather than the declared column type.
pub struct SqliteRowWrapper {
    row: SqliteRow,
}

impl DatabaseRow for SqliteRowWrapper {
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let raw = self.row.try_get_raw(name)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        let type_name = raw.type_info().name().to_string();

        let value = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(self.row.try_get::<i64, _>(name)?),
            "REAL" | "NUMERIC" => DatabaseValue::Float64(self.row.try_get::<f64, _>(name)?),
            _ => DatabaseValue::String(self.row.try_get::<String, _>(name)?),
        };

        Ok(value)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[DatabaseValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(None::<String>),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::Float64(f) => query.bind(*f),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}
