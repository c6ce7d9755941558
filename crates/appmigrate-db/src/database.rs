use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use appmigrate_common::{Error, Result};
use appmigrate_config::DatabaseConfig;
use rusqlite::Connection;
use tracing::{debug, info};

/// Shared handle to the SQLite database being migrated.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Store(format!("failed to open database: {e}")))?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| Error::Store(format!("failed to enable WAL: {e}")))?;
        debug!("journal mode: {mode}");
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Store(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Store(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    /// Open the configured file, or an in-memory database when no path is set.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let db = match &config.path {
            Some(path) => Self::open(path)?,
            None => Self::in_memory()?,
        };
        db.connection()?
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| Error::Store(format!("failed to set busy timeout: {e}")))?;
        Ok(db)
    }

    /// Wrap a connection the caller already configured.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("database lock poisoned".into()))
    }

    /// Whether a table with this name exists in the main schema.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .map_err(|e| Error::Store(format!("failed to inspect schema: {e}")))?;
        Ok(count > 0)
    }
}
