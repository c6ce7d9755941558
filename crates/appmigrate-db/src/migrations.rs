use std::fmt;
use std::sync::Arc;

use rusqlite::Transaction;

/// Outcome of a unit's `up` or `down` body.
pub type UnitResult = anyhow::Result<()>;

type Operation = Arc<dyn Fn(&Transaction<'_>) -> UnitResult + Send + Sync>;

fn noop(_: &Transaction<'_>) -> UnitResult {
    Ok(())
}

/// A named, reversible change to the database.
///
/// Both directions receive the engine's open transaction; anything they do
/// is committed or rolled back together with the ledger update.
pub trait MigrationUnit: Send + Sync {
    fn id(&self) -> &str;
    fn up(&self, tx: &Transaction<'_>) -> UnitResult;
    fn down(&self, tx: &Transaction<'_>) -> UnitResult;
}

/// A migration built from two closures.
///
/// ```ignore
/// InlineMigration::new("0002_add_user_first_name")
///     .on_up(|tx| Ok(tx.execute_batch("ALTER TABLE users ADD COLUMN first_name TEXT")?))
///     .on_down(|tx| Ok(tx.execute_batch("ALTER TABLE users DROP COLUMN first_name")?))
/// ```
#[derive(Clone)]
pub struct InlineMigration {
    id: String,
    up_op: Operation,
    down_op: Operation,
}

impl InlineMigration {
    /// Both directions start as no-ops.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up_op: Arc::new(noop),
            down_op: Arc::new(noop),
        }
    }

    pub fn on_up<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> UnitResult + Send + Sync + 'static,
    {
        self.up_op = Arc::new(f);
        self
    }

    pub fn on_down<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> UnitResult + Send + Sync + 'static,
    {
        self.down_op = Arc::new(f);
        self
    }
}

impl fmt::Debug for InlineMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineMigration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl MigrationUnit for InlineMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn up(&self, tx: &Transaction<'_>) -> UnitResult {
        (self.up_op)(tx)
    }

    fn down(&self, tx: &Transaction<'_>) -> UnitResult {
        (self.down_op)(tx)
    }
}

/// A migration expressed as two SQL batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub id: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

impl MigrationUnit for SqlMigration {
    fn id(&self) -> &str {
        self.id
    }

    fn up(&self, tx: &Transaction<'_>) -> UnitResult {
        tx.execute_batch(self.up)?;
        Ok(())
    }

    fn down(&self, tx: &Transaction<'_>) -> UnitResult {
        tx.execute_batch(self.down)?;
        Ok(())
    }
}
