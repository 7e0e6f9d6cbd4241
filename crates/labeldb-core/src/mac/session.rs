//! User sessions and their active markings.

use std::collections::BTreeSet;

use super::label::EMPTY_MARKING_ID;
use super::store;
use crate::catalog::SchemaSet;
use crate::error::Error;
use crate::query::ViewContext;
use crate::storage::Transaction;

/// A principal's session.
///
/// The active markings decide which rows of a security view are visible.
/// A new session has only the empty marking active, so it sees unmarked
/// rows and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: u64,
    principal: String,
    markings: BTreeSet<u64>,
}

impl Session {
    /// Open a session. The principal name is upper-cased.
    pub fn new(id: u64, principal: &str) -> Self {
        Self {
            id,
            principal: principal.trim().to_uppercase(),
            markings: BTreeSet::from([EMPTY_MARKING_ID]),
        }
    }

    /// Session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Principal the session runs as.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Active marking ids, ascending.
    pub fn active_markings(&self) -> impl Iterator<Item = u64> + '_ {
        self.markings.iter().copied()
    }

    /// Whether a marking is active.
    pub fn is_active(&self, marking_id: u64) -> bool {
        self.markings.contains(&marking_id)
    }

    pub(crate) fn activate(&mut self, marking_id: u64) -> bool {
        self.markings.insert(marking_id)
    }

    pub(crate) fn deactivate(&mut self, marking_id: u64) -> bool {
        self.markings.remove(&marking_id)
    }
}

/// What a security view sees of a session while a statement runs.
pub struct SessionContext<'a> {
    session: &'a Session,
    schemas: &'a SchemaSet,
}

impl<'a> SessionContext<'a> {
    /// Bind a session to the catalog snapshot a statement runs against.
    pub fn new(session: &'a Session, schemas: &'a SchemaSet) -> Self {
        Self { session, schemas }
    }
}

impl ViewContext for SessionContext<'_> {
    fn session_markings(&self) -> Vec<u64> {
        self.session.active_markings().collect()
    }

    fn render_marking(&self, tx: &Transaction<'_>, marking_id: u64) -> Result<String, Error> {
        store::render_marking(self.schemas, tx, marking_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_sees_empty_marking() {
        let session = Session::new(7, " alice ");
        assert_eq!(session.principal(), "ALICE");
        assert_eq!(session.active_markings().collect::<Vec<_>>(), vec![EMPTY_MARKING_ID]);
    }

    #[test]
    fn test_activate_and_deactivate() {
        let mut session = Session::new(1, "bob");
        assert!(session.activate(4));
        assert!(!session.activate(4));
        assert!(session.is_active(4));
        assert_eq!(session.active_markings().collect::<Vec<_>>(), vec![0, 4]);

        assert!(session.deactivate(4));
        assert!(!session.deactivate(4));
        assert!(!session.is_active(4));
    }
}
