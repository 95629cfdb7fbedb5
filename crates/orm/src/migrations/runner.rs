//! Migration Runner - Executes migrations against the database
//!
//! Reconciles the migration files on disk with the ledger: applies pending
//! migrations in ascending version order, stops at the first failure and
//! reports status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::backends::{self, DatabasePool, PoolConfig};
use crate::error::{MigrationError, MigrationResult, OrmError};

use super::definitions::{
    ChecksumDrift, LedgerEntry, MigrationConfig, MigrationDefinition, MigrationRunResult, MigrationState,
    MigrationStatusEntry, StatusReport,
};
use super::executor::TransactionExecutor;
use super::ledger::MigrationLedger;
use super::registry::MigrationRegistry;

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    pub(crate) registry: MigrationRegistry,
    pub(crate) ledger: MigrationLedger,
    pub(crate) executor: TransactionExecutor,
    pub(crate) pool: Arc<dyn DatabasePool>,
}

impl MigrationRunner {
    /// Create a runner over an existing pool
    pub fn new(config: MigrationConfig, pool: Arc<dyn DatabasePool>) -> MigrationResult<Self> {
        let ledger = MigrationLedger::new(
            config.migrations_table.clone(),
            pool.backend_type().dialect(),
        )?;
        let executor = TransactionExecutor::new(Arc::clone(&pool), ledger.clone());

        Ok(Self {
            registry: MigrationRegistry::with_config(config),
            ledger,
            executor,
            pool,
        })
    }

    /// Connect to `database_url` and create a runner over the new pool
    pub async fn connect(
        config: MigrationConfig,
        database_url: &str,
        pool_config: &PoolConfig,
    ) -> MigrationResult<Self> {
        let pool = backends::connect(database_url, pool_config)
            .await
            .map_err(|e| match e {
                OrmError::Connection(msg) | OrmError::Configuration(msg) => MigrationError::Connectivity(msg),
                other => MigrationError::Connectivity(other.to_string()),
            })?;

        Self::new(config, pool)
    }

    /// Get the database pool
    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    /// Get the migration registry
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> MigrationResult<MigrationRunResult> {
        self.run_until(None).await
    }

    /// Run pending migrations up to and including `target`
    pub async fn run_migrations_to(&self, target: &str) -> MigrationResult<MigrationRunResult> {
        self.run_until(Some(target)).await
    }

    async fn run_until(&self, target: Option<&str>) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.ledger.ensure_schema(self.pool.as_ref()).await?;

        let definitions = self.registry.discover()?;
        let applied = self.ledger.list(self.pool.as_ref()).await?;

        let target = match target {
            Some(raw) => Some(
                definitions
                    .iter()
                    .find(|d| d.version.as_str() == raw)
                    .map(|d| d.version.clone())
                    .ok_or_else(|| MigrationError::unknown_version(raw, "no migration file with this version"))?,
            ),
            None => None,
        };

        let drifted = detect_drift(&definitions, &applied);
        if let Some(drift) = drifted.first() {
            if self.registry.config().strict_checksums {
                return Err(MigrationError::ChecksumMismatch {
                    version: drift.version.to_string(),
                    name: drift.name.clone(),
                    recorded: drift.recorded.clone(),
                    current: drift.current.clone(),
                });
            }
        }
        for drift in &drifted {
            tracing::warn!(
                "Migration {} ({}) changed after it was applied: recorded checksum {}, file now {}",
                drift.version,
                drift.name,
                drift.recorded,
                drift.current
            );
        }

        let to_apply: Vec<&MigrationDefinition> = pending(&definitions, &applied)
            .into_iter()
            .filter(|d| target.as_ref().map_or(true, |t| d.version <= *t))
            .collect();

        let mut result = MigrationRunResult {
            skipped_count: applied.len(),
            drifted,
            ..MigrationRunResult::default()
        };

        if to_apply.is_empty() {
            tracing::info!("Nothing to migrate");
            result.execution_time_ms = start_time.elapsed().as_millis();
            return Ok(result);
        }

        for definition in to_apply {
            if let Err(err) = self.executor.apply(definition).await {
                tracing::error!(
                    "Migration {} failed after {} migration(s) were applied in this run: {}",
                    definition.version,
                    result.applied_count(),
                    err
                );
                return Err(err);
            }
            result.applied_migrations.push(definition.version.clone());
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        tracing::info!(
            "Applied {} migration(s) in {}ms",
            result.applied_count(),
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Get migration status for all migrations (applied and pending)
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        self.ledger.ensure_schema(self.pool.as_ref()).await?;

        let definitions = self.registry.discover()?;
        let applied = self.ledger.list(self.pool.as_ref()).await?;

        let by_version: HashMap<_, _> = applied.iter().map(|e| (&e.version, e)).collect();

        let migrations = definitions
            .iter()
            .map(|definition| {
                let state = match by_version.get(&definition.version) {
                    Some(entry) => MigrationState::Executed {
                        executed_at: entry.executed_at,
                        checksum_matches: entry.checksum == definition.checksum,
                    },
                    None => MigrationState::Pending,
                };
                MigrationStatusEntry {
                    version: definition.version.clone(),
                    name: definition.name.clone(),
                    state,
                }
            })
            .collect();

        let orphaned = applied
            .iter()
            .filter(|entry| !definitions.iter().any(|d| d.version == entry.version))
            .cloned()
            .collect();

        Ok(StatusReport { migrations, orphaned })
    }
}

/// Definitions with no ledger row, in ascending version order
pub fn pending<'a>(definitions: &'a [MigrationDefinition], applied: &[LedgerEntry]) -> Vec<&'a MigrationDefinition> {
    definitions
        .iter()
        .filter(|d| !applied.iter().any(|entry| entry.version == d.version))
        .collect()
}

/// Applied migrations whose file no longer hashes to the recorded checksum
pub fn detect_drift(definitions: &[MigrationDefinition], applied: &[LedgerEntry]) -> Vec<ChecksumDrift> {
    applied
        .iter()
        .filter_map(|entry| {
            let definition = definitions.iter().find(|d| d.version == entry.version)?;
            (definition.checksum != entry.checksum).then(|| ChecksumDrift {
                version: entry.version.clone(),
                name: definition.name.clone(),
                recorded: entry.checksum.clone(),
                current: definition.checksum.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::definitions::{compute_checksum, MigrationVersion};
    use chrono::Utc;
    use std::path::PathBuf;

    fn definition(version: &str, script: &str) -> MigrationDefinition {
        MigrationDefinition {
            version: MigrationVersion::parse(version).unwrap(),
            name: format!("migration_{}", version),
            forward_script: script.to_string(),
            checksum: compute_checksum(script.as_bytes()),
            rollback_script: None,
            path: PathBuf::from(format!("{}_migration_{}.sql", version, version)),
            rollback_path: None,
        }
    }

    fn entry(version: &str, checksum: &str) -> LedgerEntry {
        LedgerEntry {
            version: MigrationVersion::parse(version).unwrap(),
            name: format!("migration_{}", version),
            executed_at: Utc::now(),
            checksum: checksum.to_string(),
        }
    }

    #[test]
    fn test_pending_preserves_version_order() {
        let definitions = vec![
            definition("000", "SELECT 0;"),
            definition("001", "SELECT 1;"),
            definition("002", "SELECT 2;"),
            definition("003", "SELECT 3;"),
        ];
        let applied = vec![entry("001", &definitions[1].checksum)];

        let versions: Vec<&str> = pending(&definitions, &applied)
            .iter()
            .map(|d| d.version.as_str())
            .collect();
        assert_eq!(versions, vec!["000", "002", "003"]);
    }

    #[test]
    fn test_pending_empty_when_all_applied() {
        let definitions = vec![definition("000", "SELECT 0;")];
        let applied = vec![entry("000", &definitions[0].checksum)];
        assert!(pending(&definitions, &applied).is_empty());
    }

    #[test]
    fn test_detect_drift() {
        let definitions = vec![definition("000", "SELECT 0;"), definition("001", "SELECT 1;")];
        let applied = vec![
            entry("000", &definitions[0].checksum),
            entry("001", &compute_checksum(b"SELECT 'old';")),
            entry("009", "deadbeef"),
        ];

        let drift = detect_drift(&definitions, &applied);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].version.as_str(), "001");
        assert_eq!(drift[0].current, definitions[1].checksum);
    }
}
