use appmigrate_common::{Error, Result};
use appmigrate_config::model::validate_table_name;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

/// One applied migration: "this unit, for this application, is applied".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub migration_id: String,
    pub app_name: String,
}

impl LedgerRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            migration_id: row.get(1)?,
            app_name: row.get(2)?,
        })
    }
}

/// Access to the applied-migrations table.
///
/// Every method borrows a connection so it can run inside the caller's
/// transaction (`rusqlite::Transaction` derefs to `Connection`).
#[derive(Debug, Clone)]
pub struct LedgerStore {
    table: String,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
        }
    }
}

impl LedgerStore {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { table })
    }

    pub fn ensure_schema(&self, conn: &Connection) -> Result<()> {
        let table = &self.table;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS [{table}] (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migration_id TEXT NOT NULL,
                app_name TEXT NOT NULL,
                UNIQUE (app_name, migration_id)
            );"
        ))
        .map_err(|e| Error::Schema(format!("failed to create ledger table {table}: {e}")))
    }

    pub fn find(
        &self,
        conn: &Connection,
        app_name: &str,
        migration_id: &str,
    ) -> Result<Option<LedgerRecord>> {
        let table = &self.table;
        conn.query_row(
            &format!(
                "SELECT id, migration_id, app_name FROM [{table}]
                 WHERE app_name = ?1 AND migration_id = ?2"
            ),
            params![app_name, migration_id],
            LedgerRecord::from_row,
        )
        .optional()
        .map_err(|e| {
            Error::Store(format!(
                "failed to fetch ledger record {app_name}/{migration_id}: {e}"
            ))
        })
    }

    pub fn find_all(&self, conn: &Connection, app_name: &str) -> Result<Vec<LedgerRecord>> {
        let table = &self.table;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, migration_id, app_name FROM [{table}]
                 WHERE app_name = ?1
                 ORDER BY id ASC"
            ))
            .map_err(|e| Error::Store(format!("failed to prepare ledger query: {e}")))?;

        let rows = stmt
            .query_map(params![app_name], LedgerRecord::from_row)
            .map_err(|e| Error::Store(format!("failed to query ledger for {app_name}: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Store(format!("failed to read ledger row: {e}")))
    }

    pub fn insert(
        &self,
        conn: &Connection,
        app_name: &str,
        migration_id: &str,
    ) -> Result<LedgerRecord> {
        let table = &self.table;
        conn.execute(
            &format!("INSERT INTO [{table}] (migration_id, app_name) VALUES (?1, ?2)"),
            params![migration_id, app_name],
        )
        .map_err(|e| {
            Error::Store(format!(
                "failed to insert ledger record {app_name}/{migration_id}: {e}"
            ))
        })?;

        Ok(LedgerRecord {
            id: conn.last_insert_rowid(),
            migration_id: migration_id.to_string(),
            app_name: app_name.to_string(),
        })
    }

    pub fn delete(&self, conn: &Connection, record: &LedgerRecord) -> Result<()> {
        let table = &self.table;
        let deleted = conn
            .execute(
                &format!("DELETE FROM [{table}] WHERE id = ?1"),
                params![record.id],
            )
            .map_err(|e| {
                Error::Store(format!(
                    "failed to delete ledger record {}/{}: {e}",
                    record.app_name, record.migration_id
                ))
            })?;

        if deleted == 0 {
            return Err(Error::Store(format!(
                "ledger record {}/{} vanished before delete",
                record.app_name, record.migration_id
            )));
        }
        Ok(())
    }

    pub fn count(&self, conn: &Connection, app_name: &str) -> Result<usize> {
        let table = &self.table;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM [{table}] WHERE app_name = ?1"),
                params![app_name],
                |row| row.get(0),
            )
            .map_err(|e| Error::Store(format!("failed to count ledger records: {e}")))?;
        Ok(count as usize)
    }
}
