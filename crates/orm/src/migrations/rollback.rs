//! Migration Rollback - Reverts a single applied migration
//!
//! Without an explicit version the highest applied version is reverted.

use std::time::Instant;

use crate::error::{MigrationError, MigrationResult};

use super::definitions::RollbackResult;
use super::runner::MigrationRunner;

impl MigrationRunner {
    /// Roll back `target`, or the most recently applied migration when `None`
    pub async fn rollback(&self, target: Option<&str>) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        self.ledger.ensure_schema(self.pool.as_ref()).await?;
        let applied = self.ledger.list(self.pool.as_ref()).await?;

        if applied.is_empty() {
            tracing::info!("Nothing to roll back");
            return Ok(RollbackResult {
                rolled_back: None,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let entry = match target {
            Some(version) => applied
                .iter()
                .find(|entry| entry.version.as_str() == version)
                .ok_or_else(|| MigrationError::unknown_version(version, "not present in the migration ledger"))?,
            // list() is ascending, so the last row is the newest version
            None => applied
                .last()
                .ok_or_else(|| MigrationError::unknown_version("", "migration ledger is empty"))?,
        };

        let definitions = self.registry.discover()?;
        let definition = definitions
            .iter()
            .find(|d| d.version == entry.version)
            .ok_or_else(|| {
                MigrationError::unknown_version(
                    entry.version.as_str(),
                    format!("applied as '{}' but its migration file no longer exists", entry.name),
                )
            })?;

        self.executor.rollback(definition).await?;

        let execution_time_ms = start_time.elapsed().as_millis();
        tracing::info!(
            "Rolled back migration {} ({}) in {}ms",
            definition.version,
            definition.name,
            execution_time_ms
        );

        Ok(RollbackResult {
            rolled_back: Some(entry.clone()),
            execution_time_ms,
        })
    }
}
