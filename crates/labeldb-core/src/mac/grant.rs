//! Credential grants and the dominance cascade.
//!
//! A principal holds credentials, each a (sensitivity, compartment) pair.
//! Holding a sensitivity in a compartment implies every sensitivity it
//! dominates in that compartment; the cascade pass writes those implied
//! grants as rows flagged `CASCADED`.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::dominance::DominanceOrder;
use super::error::{MacError, MacResult};
use super::label::{Compartment, Marking, Sensitivity};
use super::store::{self, id_value};
use super::system::SystemTransaction;
use super::tables;
use crate::query::{Delete, Filter, Insert, Select};
use crate::value::Value;

/// One user-credential row with its credential resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldCredential {
    /// User-credential row id.
    pub row_id: u64,
    /// Credential id.
    pub credential_id: u64,
    /// Sensitivity id.
    pub sensitivity_id: u64,
    /// Compartment id.
    pub compartment_id: u64,
    /// Whether the row was derived by the cascade.
    pub cascaded: bool,
}

/// Split a granted marking into its single credential.
fn credential_parts(marking: &Marking) -> MacResult<(&Sensitivity, &Compartment)> {
    match (marking.sensitivity(), marking.compartments()) {
        (Some(sensitivity), [compartment]) => Ok((sensitivity, compartment)),
        _ => Err(MacError::InvalidGrant(marking.render())),
    }
}

/// Grant a credential to a principal, then run the cascade.
///
/// The marking needs a sensitivity and exactly one compartment. Repeated
/// grants are recorded again; rows are not de-duplicated.
pub fn grant(
    stx: &mut SystemTransaction<'_>,
    principal: &str,
    marking: &Marking,
    order: &DominanceOrder,
) -> MacResult<()> {
    let (sensitivity, compartment) = credential_parts(marking)?;
    let sensitivity = store::resolve_sensitivity(stx, sensitivity)?;
    let compartment = store::resolve_compartment(stx, compartment)?;

    let credential_id = credential_of(stx, &sensitivity, &compartment)?;
    insert_user_credential(stx, principal, credential_id, false)?;
    info!(
        principal,
        credential = %format!("{}/{}", sensitivity.name(), compartment.name()),
        "credential granted"
    );

    cascade_cleanup(stx, order)?;
    Ok(())
}

/// Revoke a credential from a principal.
///
/// Removes the principal's rows for the credential and the principal's
/// cascaded rows in the same compartment, then runs the cascade again so
/// implied grants still justified by remaining credentials come back.
/// Returns the number of direct grants removed. Labels are looked up, never
/// created.
pub fn revoke(
    stx: &mut SystemTransaction<'_>,
    principal: &str,
    marking: &Marking,
    order: &DominanceOrder,
) -> MacResult<usize> {
    let (sensitivity, compartment) = credential_parts(marking)?;
    let (Some(sensitivity), Some(compartment)) = (
        store::find_sensitivity(stx, sensitivity.name())?,
        store::find_compartment(stx, compartment.name())?,
    ) else {
        return Ok(0);
    };
    let credential_id = credential_of(stx, &sensitivity, &compartment)?;
    let compartment_id = compartment.id().unwrap_or_default();

    let held = held_credentials(stx, principal)?;
    let direct = held
        .iter()
        .filter(|h| h.credential_id == credential_id && !h.cascaded)
        .count();

    for row in held
        .iter()
        .filter(|h| h.credential_id == credential_id || (h.cascaded && h.compartment_id == compartment_id))
    {
        stx.delete(
            &Delete::new(tables::user_credential()).filter(Filter::eq("USER_CREDENTIAL_ID", row.row_id)),
        )?;
    }
    info!(
        principal,
        credential = %format!("{}/{}", sensitivity.name(), compartment.name()),
        removed = direct,
        "credential revoked"
    );

    cascade_cleanup(stx, order)?;
    Ok(direct)
}

/// Derive every grant implied by dominance. Returns how many were added.
///
/// For each principal and each compartment they hold a credential in, every
/// known sensitivity they do not yet hold there is granted if a sensitivity
/// they already held there at the start of that compartment's pass
/// dominates it. The pass is a single sweep.
pub fn cascade_cleanup(stx: &mut SystemTransaction<'_>, order: &DominanceOrder) -> MacResult<usize> {
    let sensitivities = store::sensitivities(stx)?;
    let principals: BTreeSet<String> = stx
        .select(&Select::new(tables::user_credential()).columns(["USER_NAME"]))?
        .column_values("USER_NAME")
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let mut added = 0;
    for principal in &principals {
        let held = held_credentials(stx, principal)?;
        let compartment_ids: BTreeSet<u64> = held.iter().map(|h| h.compartment_id).collect();

        for compartment_id in compartment_ids {
            let granted: Vec<&Sensitivity> = sensitivities
                .iter()
                .filter(|s| {
                    held.iter().any(|h| {
                        h.compartment_id == compartment_id && Some(h.sensitivity_id) == s.id()
                    })
                })
                .collect();

            for candidate in &sensitivities {
                let already = granted.iter().any(|g| g.id() == candidate.id());
                let dominated = granted
                    .iter()
                    .any(|g| order.dominates(g.name(), candidate.name()));
                if already || !dominated {
                    continue;
                }

                let Some(sensitivity_id) = candidate.id() else {
                    continue;
                };
                let Some(credential_id) = store::credential_id(stx, sensitivity_id, compartment_id)? else {
                    return Err(MacError::IdentityResolutionFailure {
                        kind: "credential",
                        name: format!("{}/{}", candidate.name(), compartment_id),
                    });
                };
                insert_user_credential(stx, principal, credential_id, true)?;
                debug!(principal = principal.as_str(), sensitivity = candidate.name(), compartment_id, "cascaded grant");
                added += 1;
            }
        }
    }
    Ok(added)
}

/// The principal's user-credential rows, by row id.
pub fn held_credentials(stx: &SystemTransaction<'_>, principal: &str) -> MacResult<Vec<HeldCredential>> {
    let rows = stx.select(
        &Select::new(tables::user_credential())
            .columns(["USER_CREDENTIAL_ID", "CREDENTIAL_ID", "CASCADED"])
            .filter(Filter::eq("USER_NAME", principal)),
    )?;

    let mut held = Vec::with_capacity(rows.len());
    for row in &rows.rows {
        let [row_id, credential_id, cascaded] = row.as_slice() else {
            continue;
        };
        let credential_id = id_value(credential_id)?;
        let credential = stx.select(
            &Select::new(tables::credential())
                .columns(["SENSITIVITY_ID", "COMPARTMENT_ID"])
                .filter(Filter::eq("CREDENTIAL_ID", credential_id)),
        )?;
        let Some([sensitivity_id, compartment_id]) = credential.rows.first().map(Vec::as_slice) else {
            continue;
        };
        held.push(HeldCredential {
            row_id: id_value(row_id)?,
            credential_id,
            sensitivity_id: id_value(sensitivity_id)?,
            compartment_id: id_value(compartment_id)?,
            cascaded: cascaded.as_bool().unwrap_or(false),
        });
    }
    Ok(held)
}

/// Credentials the principal holds, as sorted `SENSITIVITY/COMPARTMENT` text.
pub fn credentials(stx: &SystemTransaction<'_>, principal: &str) -> MacResult<Vec<String>> {
    let sensitivities = store::sensitivities(stx)?;
    let compartments = store::compartments(stx)?;
    let name_of_sensitivity = |id: u64| sensitivities.iter().find(|s| s.id() == Some(id)).map(Sensitivity::name);
    let name_of_compartment = |id: u64| compartments.iter().find(|c| c.id() == Some(id)).map(Compartment::name);

    let held: BTreeSet<String> = held_credentials(stx, principal)?
        .into_iter()
        .filter_map(|h| {
            Some(format!(
                "{}/{}",
                name_of_sensitivity(h.sensitivity_id)?,
                name_of_compartment(h.compartment_id)?
            ))
        })
        .collect();
    Ok(held.into_iter().collect())
}

/// Whether the principal holds the marking's sensitivity in every one of
/// its compartments. The empty marking needs no credential.
pub fn is_cleared(stx: &SystemTransaction<'_>, principal: &str, marking: &Marking) -> MacResult<bool> {
    let Some(sensitivity) = marking.sensitivity() else {
        return Ok(true);
    };
    let Some(sensitivity) = store::find_sensitivity(stx, sensitivity.name())? else {
        return Ok(false);
    };
    let held = held_credentials(stx, principal)?;
    for compartment in marking.compartments() {
        let Some(compartment) = store::find_compartment(stx, compartment.name())? else {
            return Ok(false);
        };
        let covered = held
            .iter()
            .any(|h| Some(h.sensitivity_id) == sensitivity.id() && Some(h.compartment_id) == compartment.id());
        if !covered {
            return Ok(false);
        }
    }
    Ok(true)
}

fn credential_of(
    stx: &SystemTransaction<'_>,
    sensitivity: &Sensitivity,
    compartment: &Compartment,
) -> MacResult<u64> {
    let missing = || MacError::IdentityResolutionFailure {
        kind: "credential",
        name: format!("{}/{}", sensitivity.name(), compartment.name()),
    };
    let (Some(s), Some(c)) = (sensitivity.id(), compartment.id()) else {
        return Err(missing());
    };
    store::credential_id(stx, s, c)?.ok_or_else(missing)
}

fn insert_user_credential(
    stx: &mut SystemTransaction<'_>,
    principal: &str,
    credential_id: u64,
    cascaded: bool,
) -> MacResult<u64> {
    Ok(stx.insert(
        &Insert::new(tables::user_credential())
            .value("USER_NAME", principal)
            .value("CREDENTIAL_ID", credential_id)
            .value("CASCADED", Value::Bool(cascaded)),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::tests::MacFixture;

    fn grant_text(fx: &MacFixture, principal: &str, text: &str, order: &DominanceOrder) -> MacResult<()> {
        fx.system(|stx| grant(stx, principal, &Marking::parse(text)?, order))
    }

    fn held(fx: &MacFixture, principal: &str) -> Vec<String> {
        fx.system(|stx| credentials(stx, principal)).unwrap()
    }

    #[test]
    fn test_grant_arity() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        assert!(matches!(
            grant_text(&fx, "ALICE", "SECRET/A/B", &order),
            Err(MacError::InvalidGrant(_))
        ));
        assert!(matches!(
            grant_text(&fx, "ALICE", "", &order),
            Err(MacError::InvalidGrant(_))
        ));
        // Nothing was persisted by the failed grants
        assert_eq!(fx.count(tables::sensitivity()), 0);

        grant_text(&fx, "ALICE", "SECRET/A", &order).unwrap();
        assert_eq!(fx.count(tables::user_credential()), 1);
    }

    #[test]
    fn test_cascade_runs_downward_only() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        // Make BETA known
        fx.system(|stx| store::resolve_sensitivity(stx, &Sensitivity::new("BETA")))
            .unwrap();

        grant_text(&fx, "ALICE", "ALPHA/OPS", &order).unwrap();
        assert_eq!(held(&fx, "ALICE"), vec!["ALPHA/OPS"]);

        grant_text(&fx, "BOB", "BETA/OPS", &order).unwrap();
        assert_eq!(held(&fx, "BOB"), vec!["ALPHA/OPS", "BETA/OPS"]);
        // ALICE is unchanged
        assert_eq!(held(&fx, "ALICE"), vec!["ALPHA/OPS"]);
    }

    #[test]
    fn test_cascade_stays_in_compartment() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        grant_text(&fx, "ALICE", "A/X", &order).unwrap();
        grant_text(&fx, "ALICE", "B/Y", &order).unwrap();
        assert_eq!(held(&fx, "ALICE"), vec!["A/X", "A/Y", "B/Y"]);
    }

    #[test]
    fn test_cascade_covers_all_lower_levels() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        for s in ["A", "B", "C"] {
            fx.system(|stx| store::resolve_sensitivity(stx, &Sensitivity::new(s)))
                .unwrap();
        }
        grant_text(&fx, "ALICE", "C/OPS", &order).unwrap();
        assert_eq!(held(&fx, "ALICE"), vec!["A/OPS", "B/OPS", "C/OPS"]);
    }

    #[test]
    fn test_ranked_order() {
        let fx = MacFixture::new();
        let order = DominanceOrder::ranked(["LOW", "HIGH"]);
        fx.system(|stx| store::resolve_sensitivity(stx, &Sensitivity::new("LOW")))
            .unwrap();
        grant_text(&fx, "ALICE", "HIGH/OPS", &order).unwrap();
        assert_eq!(held(&fx, "ALICE"), vec!["HIGH/OPS", "LOW/OPS"]);
    }

    #[test]
    fn test_duplicate_grants_recorded() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        grant_text(&fx, "ALICE", "S/OPS", &order).unwrap();
        grant_text(&fx, "ALICE", "S/OPS", &order).unwrap();
        assert_eq!(fx.count(tables::user_credential()), 2);
        assert_eq!(held(&fx, "ALICE"), vec!["S/OPS"]);
    }

    #[test]
    fn test_revoke_removes_direct_and_derived() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        grant_text(&fx, "ALICE", "A/OPS", &order).unwrap();
        grant_text(&fx, "ALICE", "C/OPS", &order).unwrap();
        grant_text(&fx, "ALICE", "B/OPS", &order).unwrap();
        assert_eq!(held(&fx, "ALICE"), vec!["A/OPS", "B/OPS", "C/OPS"]);

        let removed = fx
            .system(|stx| revoke(stx, "ALICE", &Marking::parse("C/OPS")?, &order))
            .unwrap();
        assert_eq!(removed, 1);
        // A and B were granted directly and stay
        assert_eq!(held(&fx, "ALICE"), vec!["A/OPS", "B/OPS"]);
    }

    #[test]
    fn test_revoke_restores_still_implied_grants() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        fx.system(|stx| store::resolve_sensitivity(stx, &Sensitivity::new("A")))
            .unwrap();
        grant_text(&fx, "ALICE", "C/OPS", &order).unwrap();
        grant_text(&fx, "ALICE", "B/OPS", &order).unwrap();

        fx.system(|stx| revoke(stx, "ALICE", &Marking::parse("C/OPS")?, &order))
            .unwrap();
        // B still implies A
        assert_eq!(held(&fx, "ALICE"), vec!["A/OPS", "B/OPS"]);

        fx.system(|stx| revoke(stx, "ALICE", &Marking::parse("B/OPS")?, &order))
            .unwrap();
        assert!(held(&fx, "ALICE").is_empty());
    }

    #[test]
    fn test_revoke_unknown_is_noop() {
        let fx = MacFixture::new();
        let removed = fx
            .system(|stx| revoke(stx, "ALICE", &Marking::parse("NOPE/NONE")?, &DominanceOrder::Alphabetical))
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(fx.count(tables::sensitivity()), 0);
    }

    #[test]
    fn test_is_cleared() {
        let fx = MacFixture::new();
        let order = DominanceOrder::Alphabetical;
        grant_text(&fx, "ALICE", "S/A", &order).unwrap();
        grant_text(&fx, "ALICE", "S/B", &order).unwrap();

        let check = |text: &str| {
            fx.system(|stx| is_cleared(stx, "ALICE", &Marking::parse(text)?))
                .unwrap()
        };
        assert!(check(""));
        assert!(check("S/A"));
        assert!(check("S/A/B"));
        assert!(!check("S/A/C"));
        assert!(!check("T/A"));
        assert!(!fx
            .system(|stx| is_cleared(stx, "BOB", &Marking::parse("S/A")?))
            .unwrap());
    }
}
