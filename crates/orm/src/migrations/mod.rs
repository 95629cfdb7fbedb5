//! Migration System
//!
//! Versioned SQL migrations: discovery on disk, the ledger table, atomic
//! execution and the runner that ties them together.

pub mod definitions;
pub mod executor;
pub mod ledger;
pub mod registry;
pub mod rollback;
pub mod runner;

pub use definitions::*;
pub use executor::TransactionExecutor;
pub use ledger::MigrationLedger;
pub use registry::{MigrationFilename, MigrationRegistry};
pub use runner::MigrationRunner;
