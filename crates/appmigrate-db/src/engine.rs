use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use appmigrate_common::{Direction, Error, Result};
use appmigrate_config::MigrateConfig;
use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::application::{Application, Registry};
use crate::database::Database;
use crate::ledger::{LedgerRecord, LedgerStore};
use crate::migrations::MigrationUnit;
use crate::status::{MigrationStatus, MigrationsStatus};

/// Target value meaning "no migrations applied".
pub const ZERO: &str = "zero";

/// Where `Migrator::migrate_to` should leave an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Zero,
    Migration(String),
}

impl Target {
    /// The unit id, or `None` for [`Target::Zero`].
    pub fn id(&self) -> Option<&str> {
        match self {
            Target::Zero => None,
            Target::Migration(id) => Some(id),
        }
    }

    fn is(&self, id: &str) -> bool {
        self.id() == Some(id)
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        if value == ZERO {
            Target::Zero
        } else {
            Target::Migration(value.to_string())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Zero => f.write_str(ZERO),
            Target::Migration(id) => f.write_str(id),
        }
    }
}

/// Applies and reverts application migrations against one database.
///
/// Every public operation runs in a single immediate transaction: either all
/// of its unit executions and ledger changes commit, or none do.
pub struct Migrator {
    db: Database,
    ledger: LedgerStore,
}

impl Migrator {
    pub fn new(db: Database) -> Self {
        Self::with_ledger(db, LedgerStore::default())
    }

    pub fn with_ledger(db: Database, ledger: LedgerStore) -> Self {
        Self { db, ledger }
    }

    pub fn from_config(config: &MigrateConfig) -> Result<Self> {
        let ledger = LedgerStore::new(config.ledger.table.as_str())?;
        let db = Database::from_config(&config.database)?;
        Ok(Self::with_ledger(db, ledger))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Apply every unit of `app` that has no ledger record, in declared order.
    /// Returns the newly applied units.
    pub fn migrate(&self, app: &dyn Application) -> Result<MigrationsStatus> {
        let name = app.name();
        let units = declared_units(app)?;
        debug!(app = name, "starting migration");

        self.in_transaction("migrate", name, |tx| {
            self.ledger.ensure_schema(tx)?;

            let mut changes = MigrationsStatus::new();
            for unit in &units {
                if self.ledger.find(tx, name, unit.id())?.is_none() {
                    changes.push(self.apply(tx, name, unit.as_ref())?);
                }
            }
            Ok(changes)
        })
    }

    /// Move `app` forward or backward until `target` is the last applied unit.
    ///
    /// `target` is a declared unit id or [`ZERO`]. An applied target is left
    /// applied; only the units after it are reverted.
    pub fn migrate_to(&self, app: &dyn Application, target: &str) -> Result<MigrationsStatus> {
        let name = app.name();
        let units = declared_units(app)?;
        let target = Target::from(target);
        debug!(app = name, target = %target, "starting migration");

        let unknown = target
            .id()
            .filter(|id| !units.iter().any(|unit| unit.id() == *id));
        if let Some(id) = unknown {
            return Err(Error::UnknownMigration {
                app: name.to_string(),
                id: id.to_string(),
            });
        }

        self.in_transaction("migrate_to", name, |tx| {
            self.ledger.ensure_schema(tx)?;
            let mut applied: HashMap<String, LedgerRecord> = self
                .ledger
                .find_all(tx, name)?
                .into_iter()
                .map(|record| (record.migration_id.clone(), record))
                .collect();

            let mut changes = MigrationsStatus::new();
            let target_applied = match target.id() {
                None => true,
                Some(id) => applied.contains_key(id),
            };

            if target_applied {
                debug!(app = name, target = %target, "reverting units after target");
                for unit in units.iter().rev() {
                    if target.is(unit.id()) {
                        break;
                    }
                    if let Some(record) = applied.remove(unit.id()) {
                        changes.push(self.revert(tx, name, unit.as_ref(), &record)?);
                    }
                }
            } else {
                debug!(app = name, target = %target, "applying units up to target");
                for unit in &units {
                    if !applied.contains_key(unit.id()) {
                        changes.push(self.apply(tx, name, unit.as_ref())?);
                    }
                    if target.is(unit.id()) {
                        break;
                    }
                }
            }
            Ok(changes)
        })
    }

    /// Report every declared unit of `app` with whether it is applied.
    pub fn show_migrations(&self, app: &dyn Application) -> Result<MigrationsStatus> {
        let name = app.name();
        let units = declared_units(app)?;

        self.in_transaction("show_migrations", name, |tx| {
            self.ledger.ensure_schema(tx)?;
            let applied: HashSet<String> = self
                .ledger
                .find_all(tx, name)?
                .into_iter()
                .map(|record| record.migration_id)
                .collect();

            let statuses = units.iter().map(|unit| {
                let id = unit.id();
                MigrationStatus::new(name, id, applied.contains(id))
            });
            Ok(statuses.collect())
        })
    }

    /// Sync every registered application, one transaction each. Stops at the
    /// first failure; applications migrated before it stay migrated.
    pub fn migrate_all(&self, registry: &Registry) -> Result<MigrationsStatus> {
        let mut changes = MigrationsStatus::new();
        for app in registry.iter() {
            changes.extend(self.migrate(app)?);
        }
        Ok(changes)
    }

    pub fn show_all(&self, registry: &Registry) -> Result<MigrationsStatus> {
        let mut statuses = MigrationsStatus::new();
        for app in registry.iter() {
            statuses.extend(self.show_migrations(app)?);
        }
        Ok(statuses)
    }

    /// Raw ledger rows for `app_name`, oldest first.
    pub fn ledger_records(&self, app_name: &str) -> Result<Vec<LedgerRecord>> {
        self.in_transaction("ledger_records", app_name, |tx| {
            self.ledger.ensure_schema(tx)?;
            self.ledger.find_all(tx, app_name)
        })
    }

    fn apply(
        &self,
        tx: &Transaction<'_>,
        app_name: &str,
        unit: &dyn MigrationUnit,
    ) -> Result<MigrationStatus> {
        let id = unit.id();
        if let Err(source) = unit.up(tx) {
            return Err(unit_failed(app_name, id, Direction::Up, source));
        }
        self.ledger.insert(tx, app_name, id)?;
        info!(app = app_name, migration = id, "applied migration");
        Ok(MigrationStatus::new(app_name, id, Direction::Up.applied()))
    }

    fn revert(
        &self,
        tx: &Transaction<'_>,
        app_name: &str,
        unit: &dyn MigrationUnit,
        record: &LedgerRecord,
    ) -> Result<MigrationStatus> {
        let id = unit.id();
        if let Err(source) = unit.down(tx) {
            return Err(unit_failed(app_name, id, Direction::Down, source));
        }
        self.ledger.delete(tx, record)?;
        info!(app = app_name, migration = id, "reverted migration");
        Ok(MigrationStatus::new(app_name, id, Direction::Down.applied()))
    }

    fn in_transaction<T, F>(&self, operation: &'static str, app_name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run_transaction(f).map_err(|e| {
            warn!(app = app_name, operation, "transaction rolled back: {e}");
            Error::aborted(operation, app_name, e)
        })
    }

    fn run_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.db.connection()?;
        // IMMEDIATE takes the write lock up front so two processes cannot
        // interleave ledger reads and writes.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Store(format!("failed to begin transaction: {e}")))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| Error::Store(format!("failed to commit transaction: {e}")))?;
        Ok(value)
    }
}

/// Read the units of `app` once, rejecting ids declared more than once.
fn declared_units(app: &dyn Application) -> Result<Vec<Arc<dyn MigrationUnit>>> {
    let units = app.migrations();
    let mut seen = HashSet::new();
    for unit in &units {
        if !seen.insert(unit.id()) {
            return Err(Error::DuplicateMigration {
                app: app.name().to_string(),
                id: unit.id().to_string(),
            });
        }
    }
    Ok(units)
}

fn unit_failed(app_name: &str, id: &str, direction: Direction, source: anyhow::Error) -> Error {
    Error::UnitExecution {
        app: app_name.to_string(),
        unit: id.to_string(),
        direction,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppDefinition;
    use crate::migrations::{InlineMigration, SqlMigration};

    fn migrator() -> Migrator {
        Migrator::new(Database::in_memory().unwrap())
    }

    fn notes_app() -> AppDefinition {
        AppDefinition::new("notes")
            .migration(SqlMigration {
                id: "0001_notes",
                up: "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);",
                down: "DROP TABLE notes;",
            })
            .migration(SqlMigration {
                id: "0002_tags",
                up: "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT);",
                down: "DROP TABLE tags;",
            })
            .migration(SqlMigration {
                id: "0003_note_tags",
                up: "CREATE TABLE note_tags (note_id INTEGER, tag_id INTEGER);",
                down: "DROP TABLE note_tags;",
            })
    }

    fn execute(migrator: &Migrator, sql: &str) {
        let conn = migrator.database().connection().unwrap();
        conn.execute_batch(sql).unwrap();
    }

    #[test]
    fn target_parses_zero_sentinel() {
        assert_eq!(Target::from("zero"), Target::Zero);
        assert_eq!(Target::from("0001_notes").id(), Some("0001_notes"));
        assert_eq!(Target::from("ZERO").to_string(), "ZERO");
        assert!(!Target::Zero.is("zero"));
    }

    #[test]
    fn migrate_applies_in_order_and_records() {
        let migrator = migrator();
        let changes = migrator.migrate(&notes_app()).unwrap();

        let expected = ["0001_notes", "0002_tags", "0003_note_tags"];
        assert_eq!(changes.units(), expected);
        assert!(changes.iter().all(|s| s.applied && s.app == "notes"));
        assert!(migrator.database().table_exists("note_tags").unwrap());
        assert_eq!(migrator.ledger_records("notes").unwrap().len(), 3);
    }

    #[test]
    fn empty_application_is_a_noop() {
        let migrator = migrator();
        let app = AppDefinition::new("empty");
        assert!(migrator.migrate(&app).unwrap().is_empty());
        assert!(migrator.show_migrations(&app).unwrap().is_empty());
        assert!(migrator.migrate_to(&app, ZERO).unwrap().is_empty());
    }

    #[test]
    fn migrate_to_unapplied_target_stops_after_it() {
        let migrator = migrator();
        let changes = migrator.migrate_to(&notes_app(), "0002_tags").unwrap();

        assert_eq!(changes.units(), ["0001_notes", "0002_tags"]);
        assert!(!migrator.database().table_exists("note_tags").unwrap());
    }

    #[test]
    fn migrate_to_applied_target_keeps_it() {
        let migrator = migrator();
        migrator.migrate(&notes_app()).unwrap();

        let changes = migrator.migrate_to(&notes_app(), "0001_notes").unwrap();
        assert_eq!(changes.units(), ["0003_note_tags", "0002_tags"]);
        assert!(changes.iter().all(|s| !s.applied));
        assert!(migrator.database().table_exists("notes").unwrap());
        assert!(!migrator.database().table_exists("tags").unwrap());
    }

    #[test]
    fn migrate_to_last_applied_target_changes_nothing() {
        let migrator = migrator();
        migrator.migrate(&notes_app()).unwrap();

        let changes = migrator.migrate_to(&notes_app(), "0003_note_tags");
        assert!(changes.unwrap().is_empty());
    }

    #[test]
    fn unknown_target_is_rejected_before_touching_the_database() {
        let migrator = migrator();
        let result = migrator.migrate_to(&notes_app(), "0009_missing");
        let err = result.unwrap_err();

        assert!(matches!(
            err,
            Error::UnknownMigration { ref app, ref id } if app == "notes" && id == "0009_missing"
        ));
        assert!(!migrator.database().table_exists("migrations").unwrap());
    }

    #[test]
    fn repeated_unit_ids_are_rejected_up_front() {
        let app = AppDefinition::new("notes")
            .migration(InlineMigration::new("0001_notes"))
            .migration(InlineMigration::new("0002_tags"))
            .migration(InlineMigration::new("0001_notes"));
        let migrator = migrator();

        let err = migrator.migrate(&app).unwrap_err();
        assert!(matches!(err, Error::DuplicateMigration { ref id, .. } if id == "0001_notes"));
        let err = migrator.migrate_to(&app, "0002_tags").unwrap_err();
        assert!(matches!(err, Error::DuplicateMigration { .. }));
        let err = migrator.show_migrations(&app).unwrap_err();
        assert!(matches!(err, Error::DuplicateMigration { .. }));
        assert!(!migrator.database().table_exists("migrations").unwrap());
    }

    #[test]
    fn ledger_table_that_cannot_be_created_is_a_schema_error() {
        let migrator = migrator();
        let sql = "CREATE TABLE other (id INTEGER); CREATE INDEX migrations ON other(id);";
        execute(&migrator, sql);

        let err = migrator.migrate(&notes_app()).unwrap_err();
        assert!(matches!(err, Error::Aborted { operation: "migrate", .. }));
        assert!(matches!(err.root(), Error::Schema(msg) if msg.contains("migrations")));
        assert!(!migrator.database().table_exists("notes").unwrap());
    }

    #[test]
    fn ledger_write_failure_rolls_back_the_unit() {
        let unit = SqlMigration {
            id: "0001_notes",
            up: "CREATE TABLE notes (id INTEGER PRIMARY KEY); DROP TABLE migrations;",
            down: "DROP TABLE notes;",
        };
        let app = AppDefinition::new("notes").migration(unit);
        let migrator = migrator();

        let err = migrator.migrate(&app).unwrap_err();
        assert!(matches!(err.root(), Error::Store(msg) if msg.contains("ledger record")));
        assert!(!migrator.database().table_exists("notes").unwrap());
        assert!(migrator.database().table_exists("migrations").unwrap());
        assert!(migrator.ledger_records("notes").unwrap().is_empty());
    }

    #[test]
    fn failing_down_rolls_back_earlier_reverts() {
        let stuck = InlineMigration::new("0002_stuck")
            .on_down(|_| Err(anyhow::anyhow!("cannot undo")));
        let app = AppDefinition::new("notes")
            .migration(SqlMigration {
                id: "0001_notes",
                up: "CREATE TABLE notes (id INTEGER PRIMARY KEY);",
                down: "DROP TABLE notes;",
            })
            .migration(stuck)
            .migration(SqlMigration {
                id: "0003_tags",
                up: "CREATE TABLE tags (id INTEGER PRIMARY KEY);",
                down: "DROP TABLE tags;",
            });

        let migrator = migrator();
        migrator.migrate(&app).unwrap();

        let err = migrator.migrate_to(&app, ZERO).unwrap_err();
        assert!(matches!(
            err.root(),
            Error::UnitExecution { unit, direction: Direction::Down, .. } if unit == "0002_stuck"
        ));
        assert!(migrator.database().table_exists("tags").unwrap());
        let statuses = migrator.show_migrations(&app).unwrap();
        assert!(statuses.iter().all(|s| s.applied));
    }

    #[test]
    fn custom_ledger_table_from_config() {
        let mut config = MigrateConfig::default();
        config.ledger.table = "schema_ledger".into();

        let migrator = Migrator::from_config(&config).unwrap();
        migrator.migrate(&notes_app()).unwrap();
        assert!(migrator.database().table_exists("schema_ledger").unwrap());
        assert!(!migrator.database().table_exists("migrations").unwrap());
    }

    #[test]
    fn invalid_ledger_table_in_config_fails() {
        let mut config = MigrateConfig::default();
        config.ledger.table = "drop table".into();
        let result = Migrator::from_config(&config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
