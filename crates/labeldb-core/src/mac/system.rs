//! The system transaction.
//!
//! Label and grant mutations run on one engine-wide system session. Only one
//! system transaction executes at a time, which serializes get-or-create of
//! labels and keeps the credential cross product consistent.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::error::{MacError, MacResult};
use crate::catalog::SchemaSet;
use crate::error::Error;
use crate::query::{Delete, Insert, ResultSet, Select, StatementExecutor};
use crate::storage::{StorageEngine, Transaction};
use crate::value::Value;

/// Owner of the engine-wide system session.
pub struct SystemSessions {
    session: Mutex<()>,
    timeout: Option<Duration>,
}

impl SystemSessions {
    /// Create the system session. With a timeout, waiting for a busy system
    /// session fails after that long instead of blocking indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            session: Mutex::new(()),
            timeout,
        }
    }

    /// Run `action` in a fresh system transaction.
    ///
    /// The transaction commits if the action succeeds. It is rolled back on
    /// every exit path, which is a no-op after a commit. Actions must not
    /// start another system transaction.
    pub fn execute<T, F>(
        &self,
        engine: &StorageEngine,
        schemas: Arc<SchemaSet>,
        action: F,
    ) -> MacResult<T>
    where
        F: FnOnce(&mut SystemTransaction<'_>) -> MacResult<T>,
    {
        let _session = self.acquire()?;
        let mut transaction = RollbackOnDrop(SystemTransaction {
            tx: engine.begin(),
            schemas,
        });

        let output = action(&mut transaction.0)?;
        transaction.0.tx.commit()?;
        debug!("system transaction committed");
        Ok(output)
    }

    fn acquire(&self) -> MacResult<MutexGuard<'_, ()>> {
        match self.timeout {
            Some(timeout) => self
                .session
                .try_lock_for(timeout)
                .ok_or(MacError::SystemTransactionTimeout(timeout)),
            None => Ok(self.session.lock()),
        }
    }
}

struct RollbackOnDrop<'a>(SystemTransaction<'a>);

impl Drop for RollbackOnDrop<'_> {
    fn drop(&mut self) {
        self.0.tx.rollback();
    }
}

/// A transaction on the system session.
pub struct SystemTransaction<'a> {
    tx: Transaction<'a>,
    schemas: Arc<SchemaSet>,
}

impl<'a> SystemTransaction<'a> {
    /// Catalog snapshot the transaction runs against.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    /// The underlying storage transaction.
    pub fn transaction(&self) -> &Transaction<'a> {
        &self.tx
    }

    /// Run a select.
    pub fn select(&self, select: &Select) -> Result<ResultSet, Error> {
        StatementExecutor::new(&self.schemas).select(&self.tx, select)
    }

    /// Run a select yielding at most one value.
    pub fn select_value(&self, select: &Select) -> Result<Option<Value>, Error> {
        StatementExecutor::new(&self.schemas).select_value(&self.tx, select)
    }

    /// Insert a row and return its identity.
    pub fn insert(&mut self, insert: &Insert) -> Result<u64, Error> {
        StatementExecutor::new(&self.schemas).insert(&mut self.tx, insert)
    }

    /// Delete rows and return how many were removed.
    pub fn delete(&mut self, delete: &Delete) -> Result<usize, Error> {
        StatementExecutor::new(&self.schemas).delete(&mut self.tx, delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ColumnDef, ColumnType, TableDefinition, TableRef};
    use crate::storage::StorageConfig;

    fn setup() -> (StorageEngine, Catalog) {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let catalog = Catalog::open(engine.db()).unwrap();
        catalog
            .update(&engine, |upd| -> Result<(), Error> {
                upd.create_regular_schema("sys")?;
                upd.create_table(
                    "sys",
                    TableDefinition::new("t").with_column(ColumnDef::new("v", ColumnType::Int64)),
                )?;
                Ok(())
            })
            .unwrap();
        (engine, catalog)
    }

    fn table() -> TableRef {
        TableRef::new("sys", "t")
    }

    #[test]
    fn test_commit_on_success() {
        let (engine, catalog) = setup();
        let system = SystemSessions::new(None);
        system
            .execute(&engine, catalog.snapshot(), |stx| {
                stx.insert(&Insert::new(table()).value("v", 1i64))?;
                Ok(())
            })
            .unwrap();

        let rows = StatementExecutor::new(&catalog.snapshot())
            .select(&engine.begin(), &Select::new(table()))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let (engine, catalog) = setup();
        let system = SystemSessions::new(None);
        let result: MacResult<()> = system.execute(&engine, catalog.snapshot(), |stx| {
            stx.insert(&Insert::new(table()).value("v", 1i64))?;
            Err(MacError::InvalidGrant("X".into()))
        });
        assert!(matches!(result, Err(MacError::InvalidGrant(_))));

        let rows = StatementExecutor::new(&catalog.snapshot())
            .select(&engine.begin(), &Select::new(table()))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_timeout_while_busy() {
        let (engine, catalog) = setup();
        let system = SystemSessions::new(Some(Duration::from_millis(20)));
        let held = system.session.lock();

        let result = system.execute(&engine, catalog.snapshot(), |_| Ok(()));
        assert!(matches!(result, Err(MacError::SystemTransactionTimeout(_))));

        drop(held);
        assert!(system.execute(&engine, catalog.snapshot(), |_| Ok(())).is_ok());
    }

    #[test]
    fn test_serialized_across_threads() {
        let (engine, catalog) = setup();
        let system = SystemSessions::new(None);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        system
                            .execute(&engine, catalog.snapshot(), |stx| {
                                // Read-modify-write is safe only if serialized
                                let count = stx.select(&Select::new(table()))?.len() as i64;
                                stx.insert(&Insert::new(table()).value("v", count))?;
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });

        let rows = StatementExecutor::new(&catalog.snapshot())
            .select(&engine.begin(), &Select::new(table()))
            .unwrap();
        let mut values: Vec<i64> = rows.column_values("V").iter().filter_map(|v| v.as_i64()).collect();
        values.sort_unstable();
        assert_eq!(values, (0..40).collect::<Vec<_>>());
    }
}
