//! Restricted table transformation.
//!
//! A restricted table is stored as a *shadow table* in the restricted
//! schema's shadow schema. The shadow table carries a hidden `MARKING_ID`
//! column. Users see it through a *security view* in the restricted schema
//! that joins the shadow rows against the session's active markings.

use tracing::info;

use super::error::{MacError, MacResult};
use super::label::EMPTY_MARKING_ID;
use super::{tables, MARKING, MARKING_ID};
use crate::catalog::{
    normalize, CatalogUpdate, ColumnDef, ColumnType, ForeignKeySpec, IndexSpec, JoinClause,
    Projection, TableDef, TableDefinition, TableRef, ViewDef, ViewKind, ViewQuery,
};
use crate::error::Error;
use crate::value::Value;

/// Create the shadow table for a logical table definition.
///
/// `MARKING_ID` (Int64, default 0) is appended unless the definition has
/// it. The table is created first, then `INDEX_<TABLE>_MARKING_ID`, then
/// `FK_<TABLE>_MARKING_ID` to `MAC.MARKING(MARKING_ID)`, which accepts the
/// empty marking without a referenced row.
pub fn create_shadow_table(
    upd: &mut CatalogUpdate<'_>,
    shadow_schema: &str,
    definition: TableDefinition,
) -> Result<TableDef, Error> {
    let mut definition = definition.normalized();
    if !definition.has_column(MARKING_ID) {
        definition.columns.push(
            ColumnDef::new(MARKING_ID, ColumnType::Int64)
                .not_null()
                .with_default(Value::from(EMPTY_MARKING_ID)),
        );
    }
    let name = definition.name.clone();

    let table = upd.create_table(shadow_schema, definition)?;
    let table_ref = table.table_ref();
    upd.add_index(
        &table_ref,
        IndexSpec {
            name: format!("INDEX_{}_MARKING_ID", name),
            columns: vec![MARKING_ID.to_string()],
            unique: false,
        },
    )?;
    upd.add_foreign_key(
        &table_ref,
        ForeignKeySpec {
            name: format!("FK_{}_MARKING_ID", name),
            columns: vec![MARKING_ID.to_string()],
            references: tables::marking(),
            ref_columns: vec![MARKING_ID.to_string()],
            reserved: Some(Value::from(EMPTY_MARKING_ID)),
        },
    )?;

    upd.schemas().table(&table_ref).cloned()
}

/// Build the security view query over a shadow table.
///
/// Every column except `MARKING_ID` is projected under its own name, plus
/// `MARKING` rendered from the marking id. Rows are inner-joined to
/// `MAC.SESSION_MARKING` on the marking id.
pub fn create_view_query(shadow: &TableDef) -> ViewQuery {
    let mut projections: Vec<Projection> = shadow
        .columns
        .iter()
        .filter(|c| !c.name.eq_ignore_ascii_case(MARKING_ID))
        .map(|c| Projection::Column {
            column: c.name.clone(),
            alias: c.name.clone(),
        })
        .collect();
    projections.push(Projection::RenderMarking {
        column: MARKING_ID.to_string(),
        alias: MARKING.to_string(),
    });

    ViewQuery {
        source: shadow.table_ref(),
        projections,
        join: Some(JoinClause {
            table: tables::session_marking(),
            left_column: MARKING_ID.to_string(),
            right_column: MARKING_ID.to_string(),
        }),
    }
}

/// Create a restricted table: its shadow table and its security view.
pub fn create_restricted_table(
    upd: &mut CatalogUpdate<'_>,
    schema: &str,
    definition: TableDefinition,
) -> MacResult<ViewDef> {
    let schema = normalize(schema);
    let shadow_schema = match upd.schemas().get(&schema) {
        Some(s) => match s.as_restricted() {
            Some(restricted) => restricted.shadow().name.clone(),
            None => {
                return Err(Error::Unsupported(format!("schema {} is not restricted", schema)).into())
            }
        },
        None => return Err(Error::SchemaNotFound(schema).into()),
    };
    if definition.has_column(MARKING) {
        return Err(MacError::ProtectedObject(format!(
            "column {} of {}.{}",
            MARKING,
            schema,
            normalize(&definition.name)
        )));
    }

    let shadow = create_shadow_table(upd, &shadow_schema, definition)?;
    let view = upd.add_view(
        &schema,
        &shadow.name,
        ViewKind::Restricted {
            shadow: shadow.table_ref(),
        },
        create_view_query(&shadow),
    )?;
    info!(view = %view.table_ref(), shadow = %shadow.table_ref(), "restricted table created");
    Ok(view)
}

/// Drop a restricted table's security view and shadow table. Returns the
/// shadow table so its rows can be removed.
pub fn drop_restricted_table(upd: &mut CatalogUpdate<'_>, view: &TableRef) -> MacResult<TableDef> {
    let shadow = match upd.schemas().view(view)?.shadow() {
        Some(shadow) => shadow.clone(),
        None => {
            return Err(Error::Unsupported(format!("{} is not a restricted table", view)).into())
        }
    };
    upd.drop_view(view)?;
    let table = upd.drop_table(&shadow)?;
    info!(view = %view, shadow = %shadow, "restricted table dropped");
    Ok(table)
}
