//! Catalog manager for storing and retrieving schema metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use sled::{Db, Tree};
use tracing::debug;

use super::{
    normalize, ConstraintDef, ForeignKeyDef, ForeignKeySpec, IndexDef, IndexSpec,
    RegularSchema, RestrictedSchema, Schema, TableDef, TableDefinition, TableRef, ViewDef,
    ViewKind, ViewQuery,
};
use crate::error::Error;
use crate::storage::StorageEngine;

/// Tree name for schema documents.
const SCHEMA_TREE: &str = "catalog:schemas";

/// A table or view found by name.
#[derive(Debug, Clone, Copy)]
pub enum Object<'a> {
    /// A physical table.
    Table(&'a TableDef),
    /// A view.
    View(&'a ViewDef),
}

/// An immutable set of schemas, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaSet {
    /// Top-level schema by name.
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// All top-level schemas by name.
    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    /// Resolve a schema that can hold tables: a regular top-level schema, or
    /// the shadow schema of a restricted one. The flag is true for shadows.
    pub fn regular(&self, name: &str) -> Option<(&RegularSchema, bool)> {
        match self.schemas.get(name) {
            Some(Schema::Regular(s)) => Some((s, false)),
            Some(Schema::Restricted(_)) => None,
            None => self
                .schemas
                .values()
                .filter_map(Schema::as_restricted)
                .map(RestrictedSchema::shadow)
                .find(|s| s.name == name)
                .map(|s| (s, true)),
        }
    }

    fn regular_mut(&mut self, name: &str) -> Result<&mut RegularSchema, Error> {
        if self.schemas.contains_key(name) {
            return match self.schemas.get_mut(name) {
                Some(Schema::Regular(s)) => Ok(s),
                _ => Err(Error::Unsupported(format!(
                    "restricted schema {} holds no tables",
                    name
                ))),
            };
        }
        self.schemas
            .values_mut()
            .filter_map(Schema::as_restricted_mut)
            .map(RestrictedSchema::shadow_mut)
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SchemaNotFound(name.to_string()))
    }

    /// Every physical table, shadow tables included.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.schemas.values().flat_map(|schema| -> Box<dyn Iterator<Item = &TableDef> + '_> {
            match schema {
                Schema::Regular(s) => Box::new(s.tables()),
                Schema::Restricted(s) => Box::new(s.shadow().tables()),
            }
        })
    }

    /// Whether the name belongs to the shadow schema of a restricted schema.
    pub fn is_shadow_schema(&self, name: &str) -> bool {
        matches!(self.regular(name), Some((_, true)))
    }

    /// Whether a top-level or shadow schema has this name.
    pub fn contains_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name) || self.is_shadow_schema(name)
    }

    /// Name of the top-level schema that stores the given (possibly shadow)
    /// schema.
    fn owner(&self, name: &str) -> Option<String> {
        if self.schemas.contains_key(name) {
            return Some(name.to_string());
        }
        self.schemas
            .values()
            .filter_map(Schema::as_restricted)
            .find(|r| r.shadow().name == name)
            .map(|r| r.name.clone())
    }

    /// Find a physical table.
    pub fn table(&self, table: &TableRef) -> Result<&TableDef, Error> {
        match self.regular(&table.schema) {
            Some((schema, _)) => schema
                .find_table(&table.name)
                .ok_or_else(|| Error::ObjectNotFound(table.to_string())),
            None if self.schemas.contains_key(&table.schema) => {
                Err(Error::ObjectNotFound(table.to_string()))
            }
            None => Err(Error::SchemaNotFound(table.schema.clone())),
        }
    }

    /// Find a view.
    pub fn view(&self, view: &TableRef) -> Result<&ViewDef, Error> {
        let schema = self
            .schemas
            .get(&view.schema)
            .ok_or_else(|| Error::SchemaNotFound(view.schema.clone()))?;
        schema
            .find_view(&view.name)
            .ok_or_else(|| Error::ObjectNotFound(view.to_string()))
    }

    /// Find a table or view by name.
    pub fn object(&self, name: &TableRef) -> Result<Object<'_>, Error> {
        if let Ok(table) = self.table(name) {
            return Ok(Object::Table(table));
        }
        if let Some(view) = self.schemas.get(&name.schema).and_then(|s| s.find_view(&name.name)) {
            return Ok(Object::View(view));
        }
        if self.contains_schema(&name.schema) {
            Err(Error::ObjectNotFound(name.to_string()))
        } else {
            Err(Error::SchemaNotFound(name.schema.clone()))
        }
    }
}

/// The catalog manager for schema metadata.
///
/// Schemas are stored as JSON documents, one per top-level schema, and
/// cached in memory. Readers take a cheap snapshot; writers build a new
/// snapshot with [`Catalog::update`] and swap it in once it is persisted.
pub struct Catalog {
    /// Schema documents tree.
    schema_tree: Tree,
    /// Current schemas (cached).
    schemas: RwLock<Arc<SchemaSet>>,
}

impl Catalog {
    /// Open or create a catalog using the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let schema_tree = db.open_tree(SCHEMA_TREE)?;

        let mut schemas = BTreeMap::new();
        for entry in schema_tree.iter() {
            let (_, bytes) = entry?;
            let schema: Schema = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Deserialization(e.to_string()))?;
            schemas.insert(schema.name().to_string(), schema);
        }
        debug!(schemas = schemas.len(), "catalog loaded");

        Ok(Self {
            schema_tree,
            schemas: RwLock::new(Arc::new(SchemaSet { schemas })),
        })
    }

    /// Snapshot of the current schemas.
    pub fn snapshot(&self) -> Arc<SchemaSet> {
        Arc::clone(&self.schemas.read())
    }

    /// Apply a set of catalog changes atomically.
    ///
    /// The closure works on a private copy. If it fails nothing is persisted
    /// and the cached schemas are unchanged.
    pub fn update<T, E, F>(&self, engine: &StorageEngine, f: F) -> Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut CatalogUpdate<'_>) -> Result<T, E>,
    {
        let mut guard = self.schemas.write();
        let mut update = CatalogUpdate {
            engine,
            set: SchemaSet::clone(&guard),
            touched: BTreeSet::new(),
            dropped: BTreeSet::new(),
        };

        let output = f(&mut update)?;

        let mut batch = sled::Batch::default();
        for name in &update.dropped {
            batch.remove(name.as_bytes());
        }
        for name in &update.touched {
            if let Some(schema) = update.set.schemas.get(name) {
                let bytes = serde_json::to_vec(schema)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                batch.insert(name.as_bytes(), bytes);
            }
        }
        self.schema_tree.apply_batch(batch).map_err(Error::from)?;

        *guard = Arc::new(update.set);
        Ok(output)
    }

    /// Flush catalog changes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.schema_tree.flush()?;
        Ok(())
    }
}

/// A pending set of catalog changes. See [`Catalog::update`].
pub struct CatalogUpdate<'a> {
    engine: &'a StorageEngine,
    set: SchemaSet,
    touched: BTreeSet<String>,
    dropped: BTreeSet<String>,
}

impl CatalogUpdate<'_> {
    /// The schemas as modified so far.
    pub fn schemas(&self) -> &SchemaSet {
        &self.set
    }

    /// The storage engine, for id generation.
    pub fn engine(&self) -> &StorageEngine {
        self.engine
    }

    fn touch(&mut self, schema: &str) {
        if let Some(owner) = self.set.owner(schema) {
            self.dropped.remove(&owner);
            self.touched.insert(owner);
        }
    }

    fn check_schema_name_free(&self, name: &str) -> Result<(), Error> {
        if self.set.contains_schema(name) {
            return Err(Error::ObjectExists(name.to_string()));
        }
        Ok(())
    }

    /// Create a regular schema.
    pub fn create_regular_schema(&mut self, name: &str) -> Result<&Schema, Error> {
        let name = normalize(name);
        self.check_schema_name_free(&name)?;
        let schema = RegularSchema::new(self.engine.generate_id()?, name.clone());
        self.set.schemas.insert(name.clone(), Schema::Regular(schema));
        self.touch(&name);
        self.set
            .schemas
            .get(&name)
            .ok_or_else(|| Error::SchemaNotFound(name))
    }

    /// Create a restricted schema together with its shadow schema.
    pub fn create_restricted_schema(
        &mut self,
        name: &str,
        shadow_name: &str,
    ) -> Result<&Schema, Error> {
        let name = normalize(name);
        let shadow_name = normalize(shadow_name);
        self.check_schema_name_free(&name)?;
        self.check_schema_name_free(&shadow_name)?;
        if name == shadow_name {
            return Err(Error::ObjectExists(shadow_name));
        }

        let shadow = RegularSchema::new(self.engine.generate_id()?, shadow_name);
        let schema = RestrictedSchema::new(self.engine.generate_id()?, name.clone(), shadow);
        self.set.schemas.insert(name.clone(), Schema::Restricted(schema));
        self.touch(&name);
        self.set
            .schemas
            .get(&name)
            .ok_or_else(|| Error::SchemaNotFound(name))
    }

    /// Create a table in a regular (or shadow) schema.
    ///
    /// The primary key and unique keys get backing unique indexes; foreign
    /// keys are added after the table itself exists.
    pub fn create_table(
        &mut self,
        schema: &str,
        definition: TableDefinition,
    ) -> Result<TableDef, Error> {
        let schema = normalize(schema);
        let definition = definition.normalized();
        let qualified = format!("{}.{}", schema, definition.name);

        if definition.columns.is_empty() {
            return Err(Error::InvalidData(format!("table {} has no columns", qualified)));
        }
        let mut seen = BTreeSet::new();
        for column in &definition.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidData(format!(
                    "duplicate column {} in {}",
                    column.name, qualified
                )));
            }
        }

        let mut table = TableDef {
            id: self.engine.generate_id()?,
            schema: schema.clone(),
            name: definition.name.clone(),
            kind: definition.kind,
            columns: definition.columns.clone(),
            indexes: Vec::new(),
            constraints: Vec::new(),
        };

        if let Some(columns) = &definition.primary_key {
            let name = format!("PK_{}", table.name);
            let index = self.build_index(&table, &format!("{}_INDEX", name), columns, true)?;
            for column in &mut table.columns {
                if columns.contains(&column.name) {
                    column.nullable = false;
                }
            }
            table.constraints.push(ConstraintDef::PrimaryKey {
                name,
                columns: columns.clone(),
                index: index.name.clone(),
            });
            table.indexes.push(index);
        }

        for (n, unique) in definition.unique.iter().enumerate() {
            let name = unique
                .name
                .clone()
                .unwrap_or_else(|| format!("UK_{}_{}", table.name, n + 1));
            let index =
                self.build_index(&table, &format!("{}_INDEX", name), &unique.columns, true)?;
            table.constraints.push(ConstraintDef::Unique {
                name,
                columns: unique.columns.clone(),
                index: index.name.clone(),
            });
            table.indexes.push(index);
        }

        for spec in &definition.indexes {
            let index = self.build_index(&table, &spec.name, &spec.columns, spec.unique)?;
            table.indexes.push(index);
        }

        let table_ref = table.table_ref();
        self.set.regular_mut(&schema)?.add_table(table)?;
        self.touch(&schema);
        debug!(table = %table_ref, "table defined");

        for fk in definition.foreign_keys {
            self.add_foreign_key(&table_ref, fk)?;
        }

        self.set.table(&table_ref).cloned()
    }

    fn build_index(
        &self,
        table: &TableDef,
        name: &str,
        columns: &[String],
        unique: bool,
    ) -> Result<IndexDef, Error> {
        if columns.is_empty() {
            return Err(Error::InvalidData(format!("index {} has no columns", name)));
        }
        let columns = columns
            .iter()
            .map(|c| {
                table
                    .column(c)
                    .map(|col| col.name.clone())
                    .ok_or_else(|| Error::UnknownColumn {
                        table: table.qualified_name(),
                        column: c.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if table.owned_names().any(|n| n == name) {
            return Err(Error::ObjectExists(format!("{}.{}", table.schema, name)));
        }
        Ok(IndexDef {
            id: self.engine.generate_id()?,
            name: name.to_string(),
            columns,
            unique,
        })
    }

    /// Add a secondary index to an existing table.
    pub fn add_index(&mut self, table: &TableRef, spec: IndexSpec) -> Result<IndexDef, Error> {
        let name = normalize(&spec.name);
        let columns: Vec<String> = spec.columns.iter().map(|c| normalize(c)).collect();
        let index = self.build_index(self.set.table(table)?, &name, &columns, spec.unique)?;

        let schema = self.set.regular_mut(&table.schema)?;
        schema.check_unique_name(&index.name)?;
        let def = schema
            .find_table_mut(&table.name)
            .ok_or_else(|| Error::ObjectNotFound(table.to_string()))?;
        def.indexes.push(index.clone());
        self.touch(&table.schema);
        Ok(index)
    }

    /// Add a foreign key to an existing table.
    ///
    /// The referenced columns must carry a unique index. An index on the
    /// referencing columns is created when none exists.
    pub fn add_foreign_key(&mut self, table: &TableRef, spec: ForeignKeySpec) -> Result<(), Error> {
        let name = normalize(&spec.name);
        let columns: Vec<String> = spec.columns.iter().map(|c| normalize(c)).collect();
        let references = TableRef::new(&spec.references.schema, &spec.references.name);
        let ref_columns: Vec<String> = spec.ref_columns.iter().map(|c| normalize(c)).collect();

        if columns.is_empty() || columns.len() != ref_columns.len() {
            return Err(Error::InvalidData(format!(
                "foreign key {} column count mismatch",
                name
            )));
        }
        if spec.reserved.is_some() && columns.len() != 1 {
            return Err(Error::InvalidData(format!(
                "foreign key {} reserves a value on more than one column",
                name
            )));
        }

        let ref_index = self
            .set
            .table(&references)?
            .unique_index_on(&ref_columns)
            .map(|i| i.name.clone())
            .ok_or_else(|| {
                Error::Unsupported(format!(
                    "no unique index on {}({})",
                    references,
                    ref_columns.join(", ")
                ))
            })?;

        self.set.regular_mut(&table.schema)?.check_unique_name(&name)?;

        let existing = self.set.table(table)?.index_on(&columns).map(|i| i.name.clone());
        let index = match existing {
            Some(index) => index,
            None => {
                self.add_index(
                    table,
                    IndexSpec {
                        name: format!("{}_INDEX", name),
                        columns: columns.clone(),
                        unique: false,
                    },
                )?
                .name
            }
        };

        let def = self
            .set
            .regular_mut(&table.schema)?
            .find_table_mut(&table.name)
            .ok_or_else(|| Error::ObjectNotFound(table.to_string()))?;
        def.constraints.push(ConstraintDef::ForeignKey(ForeignKeyDef {
            name,
            columns,
            index,
            references,
            ref_columns,
            ref_index,
            reserved: spec.reserved,
        }));
        self.touch(&table.schema);
        Ok(())
    }

    /// Register a view in a top-level schema.
    pub fn add_view(
        &mut self,
        schema: &str,
        name: &str,
        kind: ViewKind,
        query: ViewQuery,
    ) -> Result<ViewDef, Error> {
        let schema = normalize(schema);
        let source = self.set.table(&query.source)?;
        for projection in &query.projections {
            if source.column(projection.source_column()).is_none() {
                return Err(Error::UnknownColumn {
                    table: source.qualified_name(),
                    column: projection.source_column().to_string(),
                });
            }
        }
        if let Some(join) = &query.join {
            let joined = self.set.table(&join.table)?;
            if joined.column(&join.right_column).is_none() {
                return Err(Error::UnknownColumn {
                    table: joined.qualified_name(),
                    column: join.right_column.clone(),
                });
            }
            if source.column(&join.left_column).is_none() {
                return Err(Error::UnknownColumn {
                    table: source.qualified_name(),
                    column: join.left_column.clone(),
                });
            }
        }

        let view = ViewDef {
            id: self.engine.generate_id()?,
            schema: schema.clone(),
            name: normalize(name),
            kind,
            query,
        };
        self.set
            .schemas
            .get_mut(&schema)
            .ok_or_else(|| Error::SchemaNotFound(schema.clone()))?
            .add_view(view.clone())?;
        self.touch(&schema);
        Ok(view)
    }

    /// Remove a table from the catalog. Its rows are not touched.
    ///
    /// Fails while another table's foreign key or a regular view still
    /// refers to it.
    pub fn drop_table(&mut self, table: &TableRef) -> Result<TableDef, Error> {
        self.set.table(table)?;
        for schema in self.set.schemas.values() {
            let (tables, views): (Vec<&TableDef>, Vec<&ViewDef>) = match schema {
                Schema::Regular(s) => (s.tables().collect(), s.views().collect()),
                Schema::Restricted(s) => (s.shadow().tables().collect(), Vec::new()),
            };
            for other in tables.into_iter().filter(|t| t.table_ref() != *table) {
                if let Some(fk) = other.foreign_keys().find(|fk| fk.references == *table) {
                    return Err(Error::Unsupported(format!(
                        "{} is referenced by {}",
                        table, fk.name
                    )));
                }
            }
            if let Some(view) = views.into_iter().find(|v| {
                v.query.source == *table || v.query.join.as_ref().is_some_and(|j| j.table == *table)
            }) {
                return Err(Error::Unsupported(format!(
                    "{} is used by view {}",
                    table,
                    view.table_ref()
                )));
            }
        }

        let removed = self.set.regular_mut(&table.schema)?.remove_table(&table.name)?;
        self.touch(&table.schema);
        Ok(removed)
    }

    /// Remove a view from the catalog.
    pub fn drop_view(&mut self, view: &TableRef) -> Result<ViewDef, Error> {
        let removed = self
            .set
            .schemas
            .get_mut(&view.schema)
            .ok_or_else(|| Error::SchemaNotFound(view.schema.clone()))?
            .remove_view(&view.name)?;
        self.touch(&view.schema);
        Ok(removed)
    }

    /// Remove an empty top-level schema.
    pub fn drop_schema(&mut self, name: &str) -> Result<(), Error> {
        let name = normalize(name);
        let schema = self
            .set
            .schemas
            .get(&name)
            .ok_or_else(|| Error::SchemaNotFound(name.clone()))?;
        let empty = match schema {
            Schema::Regular(s) => s.tables().next().is_none() && s.views().next().is_none(),
            Schema::Restricted(s) => {
                s.views().next().is_none() && s.shadow().tables().next().is_none()
            }
        };
        if !empty {
            return Err(Error::Unsupported(format!("schema {} is not empty", name)));
        }
        self.set.schemas.remove(&name);
        self.touched.remove(&name);
        self.dropped.insert(name);
        Ok(())
    }
}
