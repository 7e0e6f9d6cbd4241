//! View execution.
//!
//! A view reads its source table, optionally inner-joins it against another
//! table on one column, and projects the result. Joined tables are usually
//! small (the session's active markings), so each join row drives an index
//! lookup into the source.

use std::collections::HashMap;

use tracing::debug;

use super::executor::{Row, StatementExecutor};
use super::filter::BoundFilter;
use super::{Filter, ResultSet, Select};
use crate::catalog::{ColumnDef, ColumnType, Projection, TableDef, ViewDef};
use crate::error::Error;
use crate::storage::Transaction;
use crate::value::Value;

/// Session-local state a view may read.
pub trait ViewContext {
    /// Active marking ids of the executing session.
    fn session_markings(&self) -> Vec<u64>;

    /// Canonical text of a stored marking id.
    fn render_marking(&self, tx: &Transaction<'_>, marking_id: u64) -> Result<String, Error>;
}

/// Run a select over a view.
pub(crate) fn execute(
    executor: &StatementExecutor<'_>,
    tx: &Transaction<'_>,
    view: &ViewDef,
    select: &Select,
) -> Result<ResultSet, Error> {
    let schemas = executor.schemas();
    let source = schemas.table(&view.query.source)?;

    let rows = match &view.query.join {
        None => executor.scan(tx, source, None)?,
        Some(join) => {
            let joined = schemas.table(&join.table)?;
            let right = joined.column_index(&join.right_column).ok_or_else(|| {
                Error::UnknownColumn {
                    table: joined.qualified_name(),
                    column: join.right_column.clone(),
                }
            })?;

            let mut rows: Vec<Row> = Vec::new();
            for (_, join_row) in executor.scan(tx, joined, None)? {
                let key = match join_row.get(right) {
                    Some(Value::Null) | None => continue,
                    Some(v) => v.clone(),
                };
                let filter = BoundFilter::bind(&Filter::Eq(join.left_column.clone(), key), source)?;
                rows.extend(executor.scan(tx, source, Some(&filter))?);
            }
            rows.sort_by_key(|(id, _)| *id);
            rows.dedup_by_key(|(id, _)| *id);
            rows
        }
    };

    let mut rendered: HashMap<u64, String> = HashMap::new();
    let mut output: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for (_, row) in rows {
        let mut out = Vec::with_capacity(view.query.projections.len());
        for projection in &view.query.projections {
            let i = source.column_index(projection.source_column()).ok_or_else(|| {
                Error::UnknownColumn {
                    table: source.qualified_name(),
                    column: projection.source_column().to_string(),
                }
            })?;
            let value = row.get(i).cloned().unwrap_or(Value::Null);
            out.push(match projection {
                Projection::Column { .. } => value,
                Projection::RenderMarking { .. } => render(executor, tx, &value, &mut rendered)?,
            });
        }
        output.push(out);
    }

    let shape = output_table(view, source);
    if let Some(filter) = &select.filter {
        let filter = BoundFilter::bind(filter, &shape)?;
        output.retain(|row| filter.matches(row));
    }

    debug!(view = %view.table_ref(), rows = output.len(), "view evaluated");

    let columns = view.column_names();
    match &select.columns {
        None => Ok(ResultSet::new(columns, output)),
        Some(names) => {
            let positions = names
                .iter()
                .map(|n| {
                    shape.column_index(n).ok_or_else(|| Error::UnknownColumn {
                        table: shape.qualified_name(),
                        column: n.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let names = positions.iter().map(|&i| columns[i].clone()).collect();
            let rows = output
                .into_iter()
                .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
                .collect();
            Ok(ResultSet::new(names, rows))
        }
    }
}

fn render(
    executor: &StatementExecutor<'_>,
    tx: &Transaction<'_>,
    value: &Value,
    cache: &mut HashMap<u64, String>,
) -> Result<Value, Error> {
    let id = match value.as_i64() {
        Some(id) if id >= 0 => id as u64,
        _ => return Ok(Value::Null),
    };
    if let Some(text) = cache.get(&id) {
        return Ok(Value::String(text.clone()));
    }
    let context = executor
        .context()
        .ok_or_else(|| Error::Unsupported("marking rendering needs a session".into()))?;
    let text = context.render_marking(tx, id)?;
    cache.insert(id, text.clone());
    Ok(Value::String(text))
}

/// Column layout of a view's output, for filter binding.
fn output_table(view: &ViewDef, source: &TableDef) -> TableDef {
    let columns = view
        .query
        .projections
        .iter()
        .map(|p| {
            let column_type = match p {
                Projection::RenderMarking { .. } => ColumnType::Text,
                Projection::Column { column, .. } => source
                    .column(column)
                    .map(|c| c.column_type)
                    .unwrap_or(ColumnType::Text),
            };
            ColumnDef::new(p.alias(), column_type)
        })
        .collect();
    TableDef {
        id: view.id,
        schema: view.schema.clone(),
        name: view.name.clone(),
        kind: source.kind,
        columns,
        indexes: Vec::new(),
        constraints: Vec::new(),
    }
}
