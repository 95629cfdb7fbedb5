//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL-specific implementation of the database
//! backend traits using sqlx as the underlying database driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Pool, Postgres, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{OrmError, OrmResult};

/// Check that a URL names a PostgreSQL database
pub fn validate_database_url(url: &str) -> OrmResult<()> {
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        return Err(OrmError::Connection("Invalid PostgreSQL URL scheme".to_string()));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| OrmError::Connection(format!("Invalid database URL: {}", e)))?;

    if parsed.host_str().is_none() {
        return Err(OrmError::Connection("Missing host in database URL".to_string()));
    }
    if parsed.path().trim_start_matches('/').is_empty() {
        return Err(OrmError::Connection("Missing database name in URL".to_string()));
    }

    Ok(())
}

/// PostgreSQL connection pool implementation
pub struct PostgresPool {
    pool: Pool<Postgres>,
}

impl PostgresPool {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a pool and verify that at least one connection can be opened
    pub async fn connect(database_url: &str, config: &PoolConfig) -> OrmResult<Self> {
        validate_database_url(database_url)?;

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        if let Some(max_lifetime) = config.max_lifetime_seconds {
            options = options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        tracing::debug!(
            "PostgreSQL pool created (max_connections={}, acquire_timeout={}s)",
            config.max_connections,
            config.acquire_timeout_seconds
        );

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(PostgresTransaction { tx }))
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
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
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
        DatabaseBackendType::PostgreSQL
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

/// PostgreSQL transaction holding one pooled connection
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl DatabaseTransaction for PostgresTransaction {
    async fn execute_script(&mut self, sql: &str) -> OrmResult<()> {
        // A bare &str goes over the simple query protocol, which accepts
        // multiple statements in one round trip.
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
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
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

/// PostgreSQL row wrapper
pub struct PostgresRow {
    row: PgRow,
}

impl PostgresRow {
    pub fn new(row: PgRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for PostgresRow {
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let column = self.row.try_column(name)?;
        let type_name = column.type_info().name().to_string();

        let value = match type_name.as_str() {
            "BOOL" => self.row.try_get::<Option<bool>, _>(name)?.map(DatabaseValue::Bool),
            "INT2" => self
                .row
                .try_get::<Option<i16>, _>(name)?
                .map(|v| DatabaseValue::Int64(v.into())),
            "INT4" => self
                .row
                .try_get::<Option<i32>, _>(name)?
                .map(|v| DatabaseValue::Int64(v.into())),
            "INT8" => self.row.try_get::<Option<i64>, _>(name)?.map(DatabaseValue::Int64),
            "FLOAT4" => self
                .row
                .try_get::<Option<f32>, _>(name)?
                .map(|v| DatabaseValue::Float64(v.into())),
            "FLOAT8" => self.row.try_get::<Option<f64>, _>(name)?.map(DatabaseValue::Float64),
            "TIMESTAMPTZ" => self
                .row
                .try_get::<Option<DateTime<Utc>>, _>(name)?
                .map(DatabaseValue::DateTime),
            "TIMESTAMP" => self
                .row
                .try_get::<Option<NaiveDateTime>, _>(name)?
                .map(|v| DatabaseValue::DateTime(DateTime::from_naive_utc_and_offset(v, Utc))),
            _ => self.row.try_get::<Option<String>, _>(name)?.map(DatabaseValue::String),
        };

        Ok(value.unwrap_or(DatabaseValue::Null))
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[DatabaseValue],
) -> Query<'q, Postgres, PgArguments> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_database_url() {
        assert!(validate_database_url("postgres://user:pw@localhost:5432/tidy").is_ok());
        assert!(validate_database_url("postgresql://localhost/tidy").is_ok());
        assert!(validate_database_url("mysql://localhost/tidy").is_err());
        assert!(validate_database_url("postgres://localhost/").is_err());
    }
}
