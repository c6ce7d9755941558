//! Ordered, reversible schema migrations for SQLite.
//!
//! Applications declare an ordered list of [`MigrationUnit`]s. The
//! [`Migrator`] records which units are applied in a ledger table and moves
//! the schema forward or backward inside a single transaction per call, so
//! the ledger and the schema never disagree after a failure.
//!
//! Concurrent callers are not coordinated beyond what SQLite itself provides:
//! a writing transaction holds the database lock until it commits. Running
//! two migrators against one database file from separate processes is the
//! caller's responsibility.

pub mod application;
pub mod database;
pub mod engine;
pub mod ledger;
pub mod migrations;
pub mod status;

pub use appmigrate_common::{Direction, Error, Result};
pub use application::{AppDefinition, Application, Registry};
pub use database::Database;
pub use engine::{Migrator, Target, ZERO};
pub use ledger::{LedgerRecord, LedgerStore};
pub use migrations::{InlineMigration, MigrationUnit, SqlMigration, UnitResult};
pub use status::{MigrationStatus, MigrationsStatus};
