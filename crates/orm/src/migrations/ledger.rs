//! Migration Ledger - Persisted record of applied migrations
//!
//! One row per applied version. Reads go straight to the pool; `record` and
//! `remove` take the caller's transaction so the ledger change commits
//! together with the script that caused it.

use crate::backends::{DatabasePool, DatabaseRow, DatabaseRowExt, DatabaseTransaction, DatabaseValue, SqlDialect};
use crate::error::{MigrationError, MigrationResult, OrmError};

use tidy_core::config::is_plain_identifier;

use super::definitions::{LedgerEntry, MigrationVersion};

/// Access to the migrations tracking table
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
    dialect: SqlDialect,
}

impl MigrationLedger {
    /// Create a ledger over `table`.
    ///
    /// The table name is interpolated into SQL, so it must be a plain identifier.
    pub fn new(table: impl Into<String>, dialect: SqlDialect) -> MigrationResult<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(MigrationError::SchemaBootstrap {
                table,
                message: "table name must be a plain SQL identifier".to_string(),
            });
        }
        Ok(Self { table, dialect })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version VARCHAR(255) PRIMARY KEY,\n    \
                name TEXT NOT NULL,\n    \
                executed_at {} NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                checksum VARCHAR(64) NOT NULL\n\
            )",
            self.table,
            self.dialect.timestamp_type()
        )
    }

    /// Create the ledger table if it does not exist yet
    pub async fn ensure_schema(&self, pool: &dyn DatabasePool) -> MigrationResult<()> {
        pool.execute(&self.create_table_sql(), &[])
            .await
            .map_err(|e| match e {
                OrmError::Connection(msg) => MigrationError::Connectivity(msg),
                other => MigrationError::SchemaBootstrap {
                    table: self.table.clone(),
                    message: other.to_string(),
                },
            })?;

        tracing::trace!("Migration ledger '{}' is ready", self.table);
        Ok(())
    }

    /// All applied migrations, ascending by version
    pub async fn list(&self, pool: &dyn DatabasePool) -> MigrationResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT version, name, executed_at, checksum FROM {} ORDER BY version",
            self.table
        );
        let rows = pool.fetch_all(&sql, &[]).await?;

        let mut entries = rows
            .iter()
            .map(|row| entry_from_row(&**row))
            .collect::<MigrationResult<Vec<_>>>()?;

        // SQL orders lexically; versions order numerically
        entries.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(entries)
    }

    /// Look up a single applied version
    pub async fn find(&self, pool: &dyn DatabasePool, version: &str) -> MigrationResult<Option<LedgerEntry>> {
        let sql = format!(
            "SELECT version, name, executed_at, checksum FROM {} WHERE version = $1",
            self.table
        );
        let rows = pool.fetch_all(&sql, &[DatabaseValue::from(version)]).await?;

        match rows.first() {
            Some(row) => Ok(Some(entry_from_row(&**row)?)),
            None => Ok(None),
        }
    }

    /// Insert the row for a freshly applied migration
    pub async fn record(
        &self,
        tx: &mut dyn DatabaseTransaction,
        version: &MigrationVersion,
        name: &str,
        checksum: &str,
    ) -> MigrationResult<()> {
        let existing = tx
            .fetch_all(
                &format!("SELECT version FROM {} WHERE version = $1", self.table),
                &[DatabaseValue::from(version.as_str())],
            )
            .await?;
        if !existing.is_empty() {
            return Err(MigrationError::DuplicateVersion(version.to_string()));
        }

        let sql = format!(
            "INSERT INTO {} (version, name, executed_at, checksum) VALUES ($1, $2, $3, $4)",
            self.table
        );
        tx.execute(
            &sql,
            &[
                DatabaseValue::from(version.as_str()),
                DatabaseValue::from(name),
                DatabaseValue::DateTime(chrono::Utc::now()),
                DatabaseValue::from(checksum),
            ],
        )
        .await?;

        Ok(())
    }

    /// Delete the row for a rolled back migration
    pub async fn remove(&self, tx: &mut dyn DatabaseTransaction, version: &MigrationVersion) -> MigrationResult<()> {
        let affected = tx
            .execute(
                &format!("DELETE FROM {} WHERE version = $1", self.table),
                &[DatabaseValue::from(version.as_str())],
            )
            .await?;

        if affected == 0 {
            return Err(MigrationError::unknown_version(
                version.as_str(),
                "no ledger row to remove",
            ));
        }
        Ok(())
    }
}

fn entry_from_row(row: &dyn DatabaseRow) -> MigrationResult<LedgerEntry> {
    let version = row.get_string("version")?;
    let version = MigrationVersion::parse(&version).map_err(|_| {
        MigrationError::Database(OrmError::Decode(format!(
            "ledger holds a non-numeric version '{}'",
            version
        )))
    })?;

    Ok(LedgerEntry {
        version,
        name: row.get_string("name")?,
        executed_at: row.get_datetime("executed_at")?,
        checksum: row.get_string("checksum")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsafe_table_names() {
        assert!(MigrationLedger::new("tidy_migrations", SqlDialect::SQLite).is_ok());
        assert!(MigrationLedger::new("_schema_log2", SqlDialect::PostgreSQL).is_ok());
        assert!(MigrationLedger::new("", SqlDialect::SQLite).is_err());
        assert!(MigrationLedger::new("1table", SqlDialect::SQLite).is_err());
        assert!(MigrationLedger::new("migrations; DROP TABLE users", SqlDialect::SQLite).is_err());
        assert!(MigrationLedger::new("a".repeat(64), SqlDialect::SQLite).is_err());
    }

    #[test]
    fn test_create_table_sql_per_dialect() {
        let pg = MigrationLedger::new("tidy_migrations", SqlDialect::PostgreSQL).unwrap();
        let sql = pg.create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS tidy_migrations"));
        assert!(sql.contains("version VARCHAR(255) PRIMARY KEY"));
        assert!(sql.contains("executed_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP"));

        let sqlite = MigrationLedger::new("tidy_migrations", SqlDialect::SQLite).unwrap();
        assert!(sqlite.create_table_sql().contains("executed_at TEXT"));
    }
}
