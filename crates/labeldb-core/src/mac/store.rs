//! Label store: get-or-create of sensitivities, compartments, and markings.
//!
//! Labels are rows in the `MAC` schema. Every persisted sensitivity has one
//! credential per persisted compartment and vice versa; creating a label
//! inserts the missing half of that cross product. All writers run inside
//! the system transaction, so lookups and creation never race.

use tracing::debug;

use super::error::{MacError, MacResult};
use super::label::{compartment_key, Compartment, Marking, Sensitivity, EMPTY_MARKING_ID};
use super::system::SystemTransaction;
use super::tables;
use crate::catalog::SchemaSet;
use crate::error::Error;
use crate::query::{Filter, Insert, ResultSet, Select, StatementExecutor};
use crate::storage::Transaction;
use crate::value::Value;

/// Resolve a sensitivity, creating it and its credentials if needed.
pub fn resolve_sensitivity(
    stx: &mut SystemTransaction<'_>,
    sensitivity: &Sensitivity,
) -> MacResult<Sensitivity> {
    if sensitivity.identity().is_resolved() {
        return Ok(sensitivity.clone());
    }
    if let Some(found) = find_sensitivity(stx, sensitivity.name())? {
        return Ok(found);
    }

    let id = stx.insert(&Insert::new(tables::sensitivity()).value("NAME", sensitivity.name()))?;
    for compartment in compartments(stx)? {
        insert_credential(stx, id, required_id(compartment.id(), "compartment", compartment.name())?)?;
    }
    debug!(sensitivity = sensitivity.name(), id, "sensitivity created");
    Ok(Sensitivity::resolved(id, sensitivity.name()))
}

/// Resolve a compartment, creating it and its credentials if needed.
pub fn resolve_compartment(
    stx: &mut SystemTransaction<'_>,
    compartment: &Compartment,
) -> MacResult<Compartment> {
    if compartment.identity().is_resolved() {
        return Ok(compartment.clone());
    }
    if let Some(found) = find_compartment(stx, compartment.name())? {
        return Ok(found);
    }

    let id = stx.insert(&Insert::new(tables::compartment()).value("NAME", compartment.name()))?;
    for sensitivity in sensitivities(stx)? {
        insert_credential(stx, required_id(sensitivity.id(), "sensitivity", sensitivity.name())?, id)?;
    }
    debug!(compartment = compartment.name(), id, "compartment created");
    Ok(Compartment::resolved(id, compartment.name()))
}

/// Resolve a marking, creating it and any missing parts.
///
/// The empty marking resolves to the reserved identity without touching
/// the store. Markings with the same canonical key share one identity.
pub fn resolve_marking(stx: &mut SystemTransaction<'_>, marking: &Marking) -> MacResult<Marking> {
    if marking.identity().is_resolved() {
        return Ok(marking.clone());
    }
    let Some(sensitivity) = marking.sensitivity() else {
        return Ok(Marking::empty());
    };

    let sensitivity = resolve_sensitivity(stx, sensitivity)?;
    let mut compartments = Vec::with_capacity(marking.compartments().len());
    for compartment in marking.compartments() {
        compartments.push(resolve_compartment(stx, compartment)?);
    }

    let sensitivity_id = required_id(sensitivity.id(), "sensitivity", sensitivity.name())?;
    let compartment_ids = compartment_ids(&compartments)?;
    let key = compartment_key(&compartment_ids);

    let id = match marking_id(stx, sensitivity_id, &key)? {
        Some(id) => id,
        None => {
            let id = stx.insert(
                &Insert::new(tables::marking())
                    .value("SENSITIVITY_ID", sensitivity_id)
                    .value("COMPARTMENT_IDS", key.as_str()),
            )?;
            for compartment_id in &compartment_ids {
                stx.insert(
                    &Insert::new(tables::marking_compartment())
                        .value("MARKING_ID", id)
                        .value("COMPARTMENT_ID", *compartment_id),
                )?;
            }
            debug!(marking = %marking, id, "marking created");
            id
        }
    };

    Ok(marking.clone().into_resolved(sensitivity, compartments, id))
}

/// Look up a sensitivity by name, ignoring case.
pub fn find_sensitivity(stx: &SystemTransaction<'_>, name: &str) -> MacResult<Option<Sensitivity>> {
    let result = stx.select(
        &Select::new(tables::sensitivity())
            .columns(["SENSITIVITY_ID", "NAME"])
            .filter(Filter::eq_ignore_case("NAME", name)),
    )?;
    Ok(first_named(&result)?.map(|(id, name)| Sensitivity::resolved(id, name)))
}

/// Look up a compartment by name, ignoring case.
pub fn find_compartment(stx: &SystemTransaction<'_>, name: &str) -> MacResult<Option<Compartment>> {
    let result = stx.select(
        &Select::new(tables::compartment())
            .columns(["COMPARTMENT_ID", "NAME"])
            .filter(Filter::eq_ignore_case("NAME", name)),
    )?;
    Ok(first_named(&result)?.map(|(id, name)| Compartment::resolved(id, name)))
}

/// Look up a marking without creating anything.
pub fn find_marking(stx: &SystemTransaction<'_>, marking: &Marking) -> MacResult<Option<Marking>> {
    if marking.identity().is_resolved() {
        return Ok(Some(marking.clone()));
    }
    let Some(sensitivity) = marking.sensitivity() else {
        return Ok(Some(Marking::empty()));
    };
    let Some(sensitivity) = find_sensitivity(stx, sensitivity.name())? else {
        return Ok(None);
    };
    let mut compartments = Vec::with_capacity(marking.compartments().len());
    for compartment in marking.compartments() {
        match find_compartment(stx, compartment.name())? {
            Some(found) => compartments.push(found),
            None => return Ok(None),
        }
    }

    let sensitivity_id = required_id(sensitivity.id(), "sensitivity", sensitivity.name())?;
    let key = compartment_key(&compartment_ids(&compartments)?);
    Ok(marking_id(stx, sensitivity_id, &key)?
        .map(|id| marking.clone().into_resolved(sensitivity, compartments, id)))
}

/// Every persisted sensitivity, by id.
pub fn sensitivities(stx: &SystemTransaction<'_>) -> MacResult<Vec<Sensitivity>> {
    let result = stx.select(&Select::new(tables::sensitivity()).columns(["SENSITIVITY_ID", "NAME"]))?;
    Ok(named_rows(&result)?
        .into_iter()
        .map(|(id, name)| Sensitivity::resolved(id, name))
        .collect())
}

/// Every persisted compartment, by id.
pub fn compartments(stx: &SystemTransaction<'_>) -> MacResult<Vec<Compartment>> {
    let result = stx.select(&Select::new(tables::compartment()).columns(["COMPARTMENT_ID", "NAME"]))?;
    Ok(named_rows(&result)?
        .into_iter()
        .map(|(id, name)| Compartment::resolved(id, name))
        .collect())
}

/// Credential id of a (sensitivity, compartment) pair.
pub fn credential_id(
    stx: &SystemTransaction<'_>,
    sensitivity_id: u64,
    compartment_id: u64,
) -> MacResult<Option<u64>> {
    let value = stx.select_value(
        &Select::new(tables::credential())
            .columns(["CREDENTIAL_ID"])
            .filter(Filter::eq("SENSITIVITY_ID", sensitivity_id))
            .filter(Filter::eq("COMPARTMENT_ID", compartment_id)),
    )?;
    value.as_ref().map(id_value).transpose()
}

/// Canonical text of a stored marking.
///
/// Reads through any transaction, so security views can render labels
/// without the system session.
pub fn render_marking(schemas: &SchemaSet, tx: &Transaction<'_>, marking_id: u64) -> Result<String, Error> {
    if marking_id == EMPTY_MARKING_ID {
        return Ok(String::new());
    }
    let executor = StatementExecutor::new(schemas);
    let not_found = || Error::ObjectNotFound(format!("marking {}", marking_id));

    let sensitivity_id = executor
        .select_value(
            tx,
            &Select::new(tables::marking())
                .columns(["SENSITIVITY_ID"])
                .filter(Filter::eq("MARKING_ID", marking_id)),
        )?
        .ok_or_else(not_found)?;
    let sensitivity = executor
        .select_value(
            tx,
            &Select::new(tables::sensitivity())
                .columns(["NAME"])
                .filter(Filter::Eq("SENSITIVITY_ID".into(), sensitivity_id)),
        )?
        .and_then(|v| v.as_str().map(Sensitivity::new))
        .ok_or_else(not_found)?;

    let mut compartments = Vec::new();
    let links = executor.select(
        tx,
        &Select::new(tables::marking_compartment())
            .columns(["COMPARTMENT_ID"])
            .filter(Filter::eq("MARKING_ID", marking_id)),
    )?;
    for compartment_id in links.column_values("COMPARTMENT_ID") {
        let name = executor
            .select_value(
                tx,
                &Select::new(tables::compartment())
                    .columns(["NAME"])
                    .filter(Filter::Eq("COMPARTMENT_ID".into(), compartment_id.clone())),
            )?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(not_found)?;
        compartments.push(Compartment::new(&name));
    }

    Ok(Marking::new(sensitivity, compartments).render())
}

fn insert_credential(
    stx: &mut SystemTransaction<'_>,
    sensitivity_id: u64,
    compartment_id: u64,
) -> MacResult<u64> {
    Ok(stx.insert(
        &Insert::new(tables::credential())
            .value("SENSITIVITY_ID", sensitivity_id)
            .value("COMPARTMENT_ID", compartment_id),
    )?)
}

fn marking_id(stx: &SystemTransaction<'_>, sensitivity_id: u64, key: &str) -> MacResult<Option<u64>> {
    let value = stx.select_value(
        &Select::new(tables::marking())
            .columns(["MARKING_ID"])
            .filter(Filter::eq("SENSITIVITY_ID", sensitivity_id))
            .filter(Filter::eq("COMPARTMENT_IDS", key)),
    )?;
    value.as_ref().map(id_value).transpose()
}

fn required_id(id: Option<u64>, kind: &'static str, name: &str) -> MacResult<u64> {
    id.ok_or_else(|| MacError::IdentityResolutionFailure {
        kind,
        name: name.to_string(),
    })
}

/// Identities of resolved compartments. An unresolved one is an error.
fn compartment_ids(compartments: &[Compartment]) -> MacResult<Vec<u64>> {
    compartments
        .iter()
        .map(|c| required_id(c.id(), "compartment", c.name()))
        .collect()
}

pub(crate) fn id_value(value: &Value) -> MacResult<u64> {
    value
        .as_id()
        .ok_or_else(|| Error::InvalidData(format!("expected an identity, got {}", value)).into())
}

/// `(id, name)` pairs of a two-column result.
fn named_rows(result: &ResultSet) -> MacResult<Vec<(u64, String)>> {
    result
        .rows
        .iter()
        .map(|row| match row.as_slice() {
            [id, Value::String(name)] => Ok((id_value(id)?, name.clone())),
            _ => Err(Error::InvalidData("malformed label row".into()).into()),
        })
        .collect()
}

fn first_named(result: &ResultSet) -> MacResult<Option<(u64, String)>> {
    Ok(named_rows(result)?.into_iter().next())
}
