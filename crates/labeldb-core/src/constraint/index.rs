//! Secondary index maintenance and lookups.
//!
//! Index entries live in the data tree next to the rows. An entry's key is
//! the index id, the encoded column values, and the row id; its value is
//! empty. Equality lookups are prefix scans.

use crate::catalog::{IndexDef, TableDef};
use crate::error::Error;
use crate::storage::{key, Transaction};
use crate::value::Value;

/// Values of a row for the columns of an index, in index order.
pub fn index_values<'v>(
    table: &TableDef,
    index: &IndexDef,
    values: &'v [Value],
) -> Result<Vec<&'v Value>, Error> {
    index
        .columns
        .iter()
        .map(|column| {
            table
                .column_index(column)
                .and_then(|i| values.get(i))
                .ok_or_else(|| Error::UnknownColumn {
                    table: table.qualified_name(),
                    column: column.clone(),
                })
        })
        .collect()
}

/// Queue index entries for a new row.
pub fn insert_entries(
    tx: &mut Transaction<'_>,
    table: &TableDef,
    row_id: u64,
    values: &[Value],
) -> Result<(), Error> {
    for index in &table.indexes {
        let key_values = index_values(table, index, values)?;
        tx.put(key::index_key(index.id, &key_values, row_id), Vec::new());
    }
    Ok(())
}

/// Queue removal of a row's index entries.
pub fn remove_entries(
    tx: &mut Transaction<'_>,
    table: &TableDef,
    row_id: u64,
    values: &[Value],
) -> Result<(), Error> {
    for index in &table.indexes {
        let key_values = index_values(table, index, values)?;
        tx.remove(key::index_key(index.id, &key_values, row_id));
    }
    Ok(())
}

/// Row ids whose indexed columns equal the given values.
pub fn lookup(tx: &Transaction<'_>, index: &IndexDef, values: &[&Value]) -> Result<Vec<u64>, Error> {
    tx.scan_prefix(&key::index_value_prefix(index.id, values))?
        .into_iter()
        .map(|(k, _)| key::decode_row_id(&k).ok_or(Error::InvalidKey))
        .collect()
}

/// Queue removal of every entry of an index.
pub fn clear(tx: &mut Transaction<'_>, index: &IndexDef) -> Result<(), Error> {
    for (k, _) in tx.scan_prefix(&key::index_prefix(index.id))? {
        tx.remove(k);
    }
    Ok(())
}
