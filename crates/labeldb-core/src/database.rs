//! Database facade combining storage, catalog, and access control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Object, SchemaKind, SchemaSet, TableDefinition, TableRef, ViewDef, ViewKind, ViewQuery};
use crate::config::{DatabaseConfig, MacConfig};
use crate::error::Error;
use crate::mac::tagging::{self, MarkingScope, WriteTarget};
use crate::mac::{
    self, grant, store, transform, MacError, MacResult, Marking, Session, SessionContext,
    SystemSessions, SystemTransaction, MARKING_ID,
};
use crate::query::{Delete, Filter, Insert, ResultSet, Select, StatementExecutor};
use crate::storage::StorageEngine;

/// A database with mandatory access control.
///
/// Every statement runs on behalf of a [`Session`]. Restricted tables are
/// reached through their security views only; label and grant changes run
/// in the system transaction.
pub struct Database {
    engine: StorageEngine,
    catalog: Catalog,
    system: SystemSessions,
    config: MacConfig,
    next_session: AtomicU64,
}

impl Database {
    /// Open a database and install the label store if it is missing.
    pub fn open(config: DatabaseConfig) -> MacResult<Self> {
        let engine = StorageEngine::open(config.storage)?;
        let catalog = Catalog::open(engine.db())?;
        let database = Self {
            engine,
            catalog,
            system: SystemSessions::new(config.mac.system_lock_timeout),
            config: config.mac,
            next_session: AtomicU64::new(1),
        };
        database.initialize_mac_schema()?;
        info!(recovered = database.engine.was_recovered(), "database opened");
        Ok(database)
    }

    /// Install the label store. Returns `false` if it already exists.
    pub fn initialize_mac_schema(&self) -> MacResult<bool> {
        Ok(self.catalog.update(&self.engine, mac::install)?)
    }

    /// The storage engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Access-control settings.
    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    /// Snapshot of the current schemas.
    pub fn schemas(&self) -> Arc<SchemaSet> {
        self.catalog.snapshot()
    }

    /// Run an action in the system transaction.
    pub fn system<T>(&self, action: impl FnOnce(&mut SystemTransaction<'_>) -> MacResult<T>) -> MacResult<T> {
        self.system.execute(&self.engine, self.catalog.snapshot(), action)
    }

    /// Create a schema. A restricted schema gets its shadow schema too.
    pub fn create_schema(&self, name: &str, kind: SchemaKind) -> MacResult<()> {
        self.catalog.update(&self.engine, |upd| -> MacResult<()> {
            match kind {
                SchemaKind::Regular => upd.create_regular_schema(name)?,
                SchemaKind::Restricted => {
                    let shadow = self.config.shadow_schema_name(&crate::catalog::normalize(name));
                    upd.create_restricted_schema(name, &shadow)?
                }
            };
            Ok(())
        })?;
        info!(schema = name, ?kind, "schema created");
        Ok(())
    }

    /// Create a table. In a restricted schema this creates the shadow table
    /// and its security view; the returned reference names the view.
    pub fn create_table(&self, schema: &str, definition: TableDefinition) -> MacResult<TableRef> {
        let schema = crate::catalog::normalize(schema);
        let table = self.catalog.update(&self.engine, |upd| -> MacResult<TableRef> {
            match upd.schemas().get(&schema).map(|s| s.kind()) {
                Some(SchemaKind::Restricted) => {
                    Ok(transform::create_restricted_table(upd, &schema, definition)?.table_ref())
                }
                _ => {
                    let table = TableRef::new(&schema, &definition.name);
                    tagging::check_writable(upd.schemas(), &table)?;
                    Ok(upd.create_table(&schema, definition)?.table_ref())
                }
            }
        })?;
        info!(table = %table, "table created");
        Ok(table)
    }

    /// Create a read-only view in a regular schema.
    pub fn create_view(&self, schema: &str, name: &str, query: ViewQuery) -> MacResult<ViewDef> {
        let view = self.catalog.update(&self.engine, |upd| -> MacResult<ViewDef> {
            let sources = std::iter::once(&query.source).chain(query.join.as_ref().map(|j| &j.table));
            for source in sources {
                if upd.schemas().is_shadow_schema(&source.schema) {
                    return Err(MacError::ProtectedObject(source.to_string()));
                }
            }
            if upd.schemas().get(&crate::catalog::normalize(schema)).is_some_and(|s| s.is_restricted()) {
                return Err(Error::Unsupported(format!("restricted schema {} holds only security views", schema)).into());
            }
            Ok(upd.add_view(schema, name, ViewKind::Regular, query)?)
        })?;
        info!(view = %view.table_ref(), "view created");
        Ok(view)
    }

    /// Drop a table or restricted table together with its rows. Returns the
    /// number of rows removed.
    pub fn drop_table(&self, table: &TableRef) -> MacResult<usize> {
        let dropped = self.catalog.update(&self.engine, |upd| -> MacResult<_> {
            let restricted = match upd.schemas().object(table)? {
                Object::View(view) => view.shadow().is_some(),
                Object::Table(_) => false,
            };
            if restricted {
                transform::drop_restricted_table(upd, table)
            } else {
                tagging::check_writable(upd.schemas(), table)?;
                Ok(upd.drop_table(table)?)
            }
        })?;

        let schemas = self.catalog.snapshot();
        let mut tx = self.engine.begin();
        let rows = StatementExecutor::new(&schemas).truncate(&mut tx, &dropped)?;
        tx.commit()?;
        self.engine.drop_sequence(dropped.id)?;
        info!(table = %table, rows, "table dropped");
        Ok(rows)
    }

    /// Open a session for a principal. Only the empty marking is active.
    pub fn open_session(&self, principal: &str) -> Session {
        let session = Session::new(self.next_session.fetch_add(1, Ordering::Relaxed), principal);
        debug!(session = session.id(), principal = session.principal(), "session opened");
        session
    }

    /// Activate a marking in a session.
    ///
    /// The principal needs the marking's sensitivity in every one of its
    /// compartments. The marking is created if it is new.
    pub fn activate_marking(&self, session: &mut Session, marking: &str) -> MacResult<Marking> {
        let marking = Marking::parse(marking)?;
        let principal = session.principal().to_string();
        let resolved = self.system(|stx| {
            if !grant::is_cleared(stx, &principal, &marking)? {
                return Err(MacError::NotCleared {
                    principal: principal.clone(),
                    marking: marking.render(),
                });
            }
            store::resolve_marking(stx, &marking)
        })
        .inspect_err(|e| warn!(session = session.id(), error = %e, "marking activation rejected"))?;

        if let Some(id) = resolved.id() {
            session.activate(id);
        }
        debug!(session = session.id(), marking = %resolved, "marking activated");
        Ok(resolved)
    }

    /// Deactivate a marking. Returns whether it was active.
    pub fn deactivate_marking(&self, session: &mut Session, marking: &str) -> MacResult<bool> {
        let marking = Marking::parse(marking)?;
        let found = self.system(|stx| store::find_marking(stx, &marking))?;
        let removed = found
            .and_then(|m| m.id())
            .is_some_and(|id| session.deactivate(id));
        debug!(session = session.id(), marking = %marking, removed, "marking deactivated");
        Ok(removed)
    }

    /// Insert a row.
    ///
    /// An insert into a restricted table is tagged with `marking`, or with
    /// the empty marking when none is given. A marking for any other table is
    /// an error.
    pub fn insert(&self, session: &Session, insert: &Insert, marking: Option<&str>) -> MacResult<u64> {
        let schemas = self.catalog.snapshot();
        let marking = marking.map(Marking::parse).transpose()?;

        let target = tagging::write_target(&schemas, insert, marking.as_ref())
            .inspect_err(|e| warn!(session = session.id(), table = %insert.table, error = %e, "insert rejected"))?;
        match target {
            WriteTarget::Table(_) => self.write(&schemas, insert),
            WriteTarget::Restricted { shadow, .. } => {
                let marking = marking.unwrap_or_default();
                let resolved = self.system(|stx| store::resolve_marking(stx, &marking))?;
                let tagged = tagging::tag_insert(insert, shadow, &resolved)?;
                debug!(session = session.id(), table = %insert.table, marking = %resolved, "row tagged");
                self.write(&schemas, &tagged)
            }
        }
    }

    fn write(&self, schemas: &SchemaSet, insert: &Insert) -> MacResult<u64> {
        let mut tx = self.engine.begin();
        let row_id = StatementExecutor::new(schemas).insert(&mut tx, insert)?;
        tx.commit()?;
        Ok(row_id)
    }

    /// Run a select. Security views show only rows whose marking is active in
    /// the session.
    pub fn select(&self, session: &Session, select: &Select) -> MacResult<ResultSet> {
        let schemas = self.catalog.snapshot();
        if schemas.is_shadow_schema(&select.table.schema) {
            warn!(session = session.id(), table = %select.table, "direct shadow read rejected");
            return Err(MacError::ProtectedObject(select.table.to_string()));
        }
        let context = SessionContext::new(session, &schemas);
        let tx = self.engine.begin();
        Ok(StatementExecutor::with_context(&schemas, &context).select(&tx, select)?)
    }

    /// Delete rows. Through a security view only rows visible to the session
    /// are deleted, and the filter may test the rendered `MARKING` column.
    /// Returns the number of rows removed.
    pub fn delete(&self, session: &Session, delete: &Delete) -> MacResult<usize> {
        let schemas = self.catalog.snapshot();
        let executor = StatementExecutor::new(&schemas);
        let mut tx = self.engine.begin();

        let removed = match schemas.object(&delete.table)? {
            Object::View(view) => {
                let Some(shadow) = view.shadow() else {
                    return Err(Error::Unsupported(format!("view {} is read-only", delete.table)).into());
                };
                let mut removed = 0;
                for marking_id in session.active_markings() {
                    let rendered = store::render_marking(&schemas, &tx, marking_id)?;
                    let MarkingScope::Rows(filter) = tagging::scope_to_marking(delete.filter.as_ref(), &rendered) else {
                        continue;
                    };
                    let mut scoped = Delete::new(shadow.clone());
                    if let Some(filter) = filter {
                        scoped = scoped.filter(filter);
                    }
                    removed += executor.delete(&mut tx, &scoped.filter(Filter::eq(MARKING_ID, marking_id)))?;
                }
                removed
            }
            Object::Table(table) => {
                tagging::check_writable(&schemas, &table.table_ref())
                    .inspect_err(|e| warn!(session = session.id(), error = %e, "delete rejected"))?;
                executor.delete(&mut tx, delete)?
            }
        };

        tx.commit()?;
        Ok(removed)
    }

    /// Grant a credential, written `SENSITIVITY/COMPARTMENT`, to a principal.
    pub fn grant(&self, session: &Session, marking: &str, principal: &str) -> MacResult<()> {
        let marking = Marking::parse(marking)?;
        let principal = principal.trim().to_uppercase();
        self.system(|stx| grant::grant(stx, &principal, &marking, &self.config.dominance))
            .inspect_err(|e| warn!(session = session.id(), error = %e, "grant rejected"))?;
        info!(by = session.principal(), to = %principal, credential = %marking, "grant complete");
        Ok(())
    }

    /// Revoke a credential from a principal. Returns the number of direct
    /// grants removed.
    pub fn revoke(&self, session: &Session, marking: &str, principal: &str) -> MacResult<usize> {
        let marking = Marking::parse(marking)?;
        let principal = principal.trim().to_uppercase();
        let removed = self
            .system(|stx| grant::revoke(stx, &principal, &marking, &self.config.dominance))
            .inspect_err(|e| warn!(session = session.id(), error = %e, "revoke rejected"))?;
        info!(by = session.principal(), from = %principal, credential = %marking, removed, "revoke complete");
        Ok(removed)
    }

    /// Credentials a principal holds, as sorted `SENSITIVITY/COMPARTMENT`.
    pub fn credentials(&self, principal: &str) -> MacResult<Vec<String>> {
        let principal = principal.trim().to_uppercase();
        self.system(|stx| grant::credentials(stx, &principal))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> MacResult<()> {
        self.engine.flush()?;
        self.catalog.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType};
    use crate::value::Value;

    fn open() -> Database {
        Database::open(DatabaseConfig::temporary()).unwrap()
    }

    fn reports() -> TableDefinition {
        TableDefinition::new("reports")
            .with_column(ColumnDef::new("id", ColumnType::Int64).not_null())
            .with_column(ColumnDef::new("body", ColumnType::Text))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_open_installs_label_store() {
        let db = open();
        assert!(db.schemas().contains_schema("MAC"));
        assert!(!db.initialize_mac_schema().unwrap());
    }

    #[test]
    fn test_create_table_dispatches_on_schema_kind() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        db.create_schema("app", SchemaKind::Regular).unwrap();

        let view = db.create_table("intel", reports()).unwrap();
        let table = db.create_table("app", reports()).unwrap();

        let schemas = db.schemas();
        assert!(schemas.view(&view).unwrap().shadow().is_some());
        assert!(schemas.table(&TableRef::new("INTEL_SHADOW", "REPORTS")).is_ok());
        assert!(schemas.table(&table).is_ok());
    }

    #[test]
    fn test_tables_in_protected_schemas_rejected() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        assert!(matches!(
            db.create_table("intel_shadow", reports()),
            Err(MacError::ProtectedObject(_))
        ));
        assert!(matches!(
            db.create_table("mac", reports()),
            Err(MacError::ProtectedObject(_))
        ));
    }

    #[test]
    fn test_insert_defaults_to_empty_marking() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        let view = db.create_table("intel", reports()).unwrap();
        let session = db.open_session("alice");

        db.insert(&session, &Insert::new(view.clone()).value("id", 1i64).value("body", "public"), None)
            .unwrap();
        let rows = db.select(&session, &Select::new(view)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(0, "MARKING"), Some(&Value::String(String::new())));
    }

    #[test]
    fn test_activation_requires_clearance() {
        let db = open();
        let admin = db.open_session("admin");
        let mut session = db.open_session("alice");

        assert!(matches!(
            db.activate_marking(&mut session, "SECRET/OPS"),
            Err(MacError::NotCleared { .. })
        ));

        db.grant(&admin, "SECRET/OPS", "alice").unwrap();
        let marking = db.activate_marking(&mut session, "secret/ops").unwrap();
        assert!(session.is_active(marking.id().unwrap()));

        assert!(db.deactivate_marking(&mut session, "SECRET/OPS").unwrap());
        assert!(!db.deactivate_marking(&mut session, "SECRET/OPS").unwrap());
    }

    #[test]
    fn test_shadow_reads_and_writes_rejected() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        db.create_table("intel", reports()).unwrap();
        let session = db.open_session("alice");
        let shadow = TableRef::new("intel_shadow", "reports");

        assert!(matches!(
            db.select(&session, &Select::new(shadow.clone())),
            Err(MacError::ProtectedObject(_))
        ));
        assert!(matches!(
            db.insert(&session, &Insert::new(shadow.clone()).value("id", 1i64), None),
            Err(MacError::ProtectedObject(_))
        ));
        assert!(matches!(
            db.delete(&session, &Delete::new(shadow)),
            Err(MacError::ProtectedObject(_))
        ));
    }

    #[test]
    fn test_delete_through_view_only_touches_visible_rows() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        let view = db.create_table("intel", reports()).unwrap();
        let admin = db.open_session("admin");
        db.grant(&admin, "S/OPS", "alice").unwrap();
        let mut alice = db.open_session("alice");
        db.activate_marking(&mut alice, "S/OPS").unwrap();

        db.insert(&alice, &Insert::new(view.clone()).value("id", 1i64), None).unwrap();
        db.insert(&alice, &Insert::new(view.clone()).value("id", 2i64), Some("S/OPS")).unwrap();

        let bob = db.open_session("bob");
        assert_eq!(db.delete(&bob, &Delete::new(view.clone())).unwrap(), 1);
        let remaining = db.select(&alice, &Select::new(view).columns(["ID"])).unwrap();
        assert_eq!(remaining.column_values("ID"), vec![&Value::Int64(2)]);
    }

    #[test]
    fn test_delete_through_view_by_marking() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        let view = db.create_table("intel", reports()).unwrap();
        let admin = db.open_session("admin");
        db.grant(&admin, "S/OPS", "alice").unwrap();
        let mut alice = db.open_session("alice");
        db.activate_marking(&mut alice, "S/OPS").unwrap();

        for (id, marking) in [(1i64, None), (2, Some("S/OPS")), (3, Some("S/OPS"))] {
            db.insert(&alice, &Insert::new(view.clone()).value("id", id), marking).unwrap();
        }

        let by_marking = Delete::new(view.clone())
            .filter(Filter::eq("MARKING", "S/OPS"))
            .filter(Filter::eq("id", 3i64));
        assert_eq!(db.delete(&alice, &by_marking).unwrap(), 1);

        let public = Delete::new(view.clone()).filter(Filter::eq("marking", ""));
        assert_eq!(db.delete(&alice, &public).unwrap(), 1);

        let remaining = db.select(&alice, &Select::new(view).columns(["ID"])).unwrap();
        assert_eq!(remaining.column_values("ID"), vec![&Value::Int64(2)]);
    }

    #[test]
    fn test_concurrent_duplicate_key_rejected_at_commit() {
        use crate::error::ConstraintError;

        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        let view = db.create_table("intel", reports()).unwrap();
        let schemas = db.schemas();
        let shadow = Insert::new(TableRef::new("INTEL_SHADOW", "REPORTS"))
            .value("id", 1i64)
            .value(MARKING_ID, 0i64);

        let mut first = db.engine().begin();
        let mut second = db.engine().begin();
        StatementExecutor::new(&schemas).insert(&mut first, &shadow).unwrap();
        StatementExecutor::new(&schemas).insert(&mut second, &shadow).unwrap();

        first.commit().unwrap();
        assert!(matches!(
            second.commit(),
            Err(Error::ConstraintViolation(ConstraintError::UniqueViolation { .. }))
        ));

        let session = db.open_session("alice");
        assert_eq!(db.select(&session, &Select::new(view)).unwrap().len(), 1);
    }

    #[test]
    fn test_drop_restricted_table_removes_rows() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        let view = db.create_table("intel", reports()).unwrap();
        let session = db.open_session("alice");
        for id in 1..=3i64 {
            db.insert(&session, &Insert::new(view.clone()).value("id", id), None).unwrap();
        }

        assert_eq!(db.drop_table(&view).unwrap(), 3);
        assert!(db.schemas().object(&view).is_err());

        // Re-creating starts from an empty table
        let view = db.create_table("intel", reports()).unwrap();
        assert!(db.select(&session, &Select::new(view)).unwrap().is_empty());
    }

    #[test]
    fn test_views_over_shadow_tables_rejected() {
        let db = open();
        db.create_schema("intel", SchemaKind::Restricted).unwrap();
        db.create_schema("app", SchemaKind::Regular).unwrap();
        db.create_table("intel", reports()).unwrap();

        let query = ViewQuery {
            source: TableRef::new("intel_shadow", "reports"),
            projections: vec![crate::catalog::Projection::Column {
                column: "BODY".into(),
                alias: "BODY".into(),
            }],
            join: None,
        };
        assert!(matches!(
            db.create_view("app", "leak", query),
            Err(MacError::ProtectedObject(_))
        ));
    }
}
