//! # tidy-orm: Database Layer for tidy
//!
//! Backend abstractions over sqlx (PostgreSQL and SQLite) and the versioned
//! SQL migration system built on them.

pub mod backends;
pub mod error;
pub mod migrations;

// Re-export core traits and types
pub use backends::{connect, DatabaseBackendType, DatabasePool, DatabaseTransaction, DatabaseValue, PoolConfig};
pub use error::*;
pub use migrations::*;
