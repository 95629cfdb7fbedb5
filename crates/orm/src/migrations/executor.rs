//! Transaction Executor - Applies or reverts one migration atomically
//!
//! Each call runs the script and the matching ledger change inside a single
//! transaction on a connection of its own. Any failure rolls the whole
//! transaction back before the error is returned.

use std::sync::Arc;

use crate::backends::{DatabasePool, DatabaseTransaction};
use crate::error::{MigrationError, MigrationResult};

use super::definitions::MigrationDefinition;
use super::ledger::MigrationLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Rollback,
}

/// Runs migration scripts and ledger mutations as one unit
pub struct TransactionExecutor {
    pool: Arc<dyn DatabasePool>,
    ledger: MigrationLedger,
}

impl TransactionExecutor {
    pub fn new(pool: Arc<dyn DatabasePool>, ledger: MigrationLedger) -> Self {
        Self { pool, ledger }
    }

    /// Execute the forward script and record the version
    pub async fn apply(&self, definition: &MigrationDefinition) -> MigrationResult<()> {
        tracing::info!("Applying migration {} ({})", definition.version, definition.name);
        self.run(definition, &definition.forward_script, Direction::Forward)
            .await
    }

    /// Execute the rollback script and remove the version from the ledger.
    ///
    /// Fails before touching the database when there is no rollback script.
    pub async fn rollback(&self, definition: &MigrationDefinition) -> MigrationResult<()> {
        let script = definition.rollback_script.as_deref().ok_or_else(|| {
            MigrationError::MissingRollbackScript {
                version: definition.version.to_string(),
                name: definition.name.clone(),
            }
        })?;

        tracing::info!(
            "Rolling back migration {} ({})",
            definition.version,
            definition.name
        );
        self.run(definition, script, Direction::Rollback).await
    }

    async fn run(&self, definition: &MigrationDefinition, script: &str, direction: Direction) -> MigrationResult<()> {
        let mut tx = self.pool.begin_transaction().await.map_err(|e| {
            MigrationError::Execution {
                version: definition.version.to_string(),
                name: definition.name.clone(),
                message: format!("failed to start transaction: {}", e),
            }
        })?;

        match self.run_in(&mut *tx, definition, script, direction).await {
            Ok(()) => tx.commit().await.map_err(|e| MigrationError::Execution {
                version: definition.version.to_string(),
                name: definition.name.clone(),
                message: format!("failed to commit: {}", e),
            }),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        "Failed to roll back transaction for migration {}: {}",
                        definition.version,
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_in(
        &self,
        tx: &mut dyn DatabaseTransaction,
        definition: &MigrationDefinition,
        script: &str,
        direction: Direction,
    ) -> MigrationResult<()> {
        if script.trim().is_empty() {
            tracing::debug!("Migration {} has an empty script", definition.version);
        } else {
            tx.execute_script(script)
                .await
                .map_err(|e| MigrationError::Execution {
                    version: definition.version.to_string(),
                    name: definition.name.clone(),
                    message: e.to_string(),
                })?;
        }

        match direction {
            Direction::Forward => {
                self.ledger
                    .record(tx, &definition.version, &definition.name, &definition.checksum)
                    .await
            }
            Direction::Rollback => self.ledger.remove(tx, &definition.version).await,
        }
    }
}
