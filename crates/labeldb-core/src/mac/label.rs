//! Label model: sensitivities, compartments, and markings.
//!
//! Labels are plain values. A label is *unresolved* until the label store
//! has found or created its row; resolution returns a new value carrying the
//! identity and never mutates the original.
//!
//! Marking text grammar: `SENSITIVITY("/"COMPARTMENT)*`, with at least one
//! compartment. Names use `[A-Za-z0-9 _-]`. The empty string is the empty
//! marking, the public label with the reserved identity `0`.

use std::fmt;
use std::str::FromStr;

use super::error::{MacError, MacResult};

/// Identity of the empty marking. Never stored as a row.
pub const EMPTY_MARKING_ID: u64 = 0;

/// Persistence state of a label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Not yet looked up in the label store.
    #[default]
    Unresolved,
    /// Row identity in the label store.
    Resolved(u64),
}

impl Identity {
    /// The identity, if resolved.
    pub fn id(&self) -> Option<u64> {
        match self {
            Identity::Resolved(id) => Some(*id),
            Identity::Unresolved => None,
        }
    }

    /// Whether the label has been resolved.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Identity::Resolved(_))
    }
}

/// One rung of the classification order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensitivity {
    name: String,
    identity: Identity,
}

impl Sensitivity {
    /// Create an unresolved sensitivity. The name is trimmed and upper-cased.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_uppercase(),
            identity: Identity::Unresolved,
        }
    }

    /// A sensitivity read back from the label store.
    pub fn resolved(id: u64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: Identity::Resolved(id),
        }
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persistence state.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Row identity, if resolved.
    pub fn id(&self) -> Option<u64> {
        self.identity.id()
    }
}

/// A category orthogonal to sensitivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compartment {
    name: String,
    identity: Identity,
}

impl Compartment {
    /// Create an unresolved compartment. The name is trimmed.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            identity: Identity::Unresolved,
        }
    }

    /// A compartment read back from the label store.
    pub fn resolved(id: u64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: Identity::Resolved(id),
        }
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persistence state.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Row identity, if resolved.
    pub fn id(&self) -> Option<u64> {
        self.identity.id()
    }
}

/// A sensitivity and a set of compartments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marking {
    sensitivity: Option<Sensitivity>,
    compartments: Vec<Compartment>,
    identity: Identity,
}

impl Marking {
    /// The empty (public) marking.
    pub fn empty() -> Self {
        Self {
            sensitivity: None,
            compartments: Vec::new(),
            identity: Identity::Resolved(EMPTY_MARKING_ID),
        }
    }

    /// Build an unresolved marking. Compartments are a set: later duplicates
    /// (case-insensitive) are dropped.
    pub fn new(sensitivity: Sensitivity, compartments: impl IntoIterator<Item = Compartment>) -> Self {
        let mut unique: Vec<Compartment> = Vec::new();
        for compartment in compartments {
            if !unique.iter().any(|c| c.name.eq_ignore_ascii_case(&compartment.name)) {
                unique.push(compartment);
            }
        }
        Self {
            sensitivity: Some(sensitivity),
            compartments: unique,
            identity: Identity::Unresolved,
        }
    }

    /// Parse marking text. Only the empty string is the empty marking.
    pub fn parse(text: &str) -> MacResult<Self> {
        if text.is_empty() {
            return Ok(Self::empty());
        }

        let mut segments = text.split('/');
        let sensitivity = segments.next().map(str::trim).unwrap_or_default();
        if sensitivity.is_empty() {
            return Err(MacError::malformed(text, "marking must begin with a sensitivity"));
        }
        validate_name(text, sensitivity)?;

        let mut compartments = Vec::new();
        // Empty segments come from repeated or trailing slashes.
        for segment in segments.filter(|s| !s.is_empty()) {
            let name = segment.trim();
            if name.is_empty() {
                return Err(MacError::malformed(text, "empty compartment"));
            }
            validate_name(text, name)?;
            compartments.push(Compartment::new(name));
        }
        if compartments.is_empty() {
            return Err(MacError::malformed(text, "marking must have at least one compartment"));
        }

        Ok(Self::new(Sensitivity::new(sensitivity), compartments))
    }

    /// Canonical text: `SENSITIVITY/C1/C2/...` with compartments sorted by
    /// name, or the empty string for the empty marking.
    pub fn render(&self) -> String {
        let Some(sensitivity) = &self.sensitivity else {
            return String::new();
        };
        let mut names: Vec<&str> = self.compartments.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();

        let mut out = sensitivity.name.clone();
        for name in names {
            out.push('/');
            out.push_str(name);
        }
        out
    }

    /// Whether this is the empty marking.
    pub fn is_empty(&self) -> bool {
        self.sensitivity.is_none()
    }

    /// Sensitivity, absent for the empty marking.
    pub fn sensitivity(&self) -> Option<&Sensitivity> {
        self.sensitivity.as_ref()
    }

    /// Compartments in the order given.
    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    /// Persistence state.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Row identity, if resolved.
    pub fn id(&self) -> Option<u64> {
        self.identity.id()
    }

    /// The marking with resolved parts and its own identity.
    pub(crate) fn into_resolved(
        self,
        sensitivity: Sensitivity,
        compartments: Vec<Compartment>,
        id: u64,
    ) -> Self {
        Self {
            sensitivity: Some(sensitivity),
            compartments,
            identity: Identity::Resolved(id),
        }
    }

    /// Canonical key: sensitivity id and the ascending, comma-joined
    /// compartment ids. `None` until every part is resolved; the empty
    /// marking has no key.
    pub fn canonical_key(&self) -> Option<(u64, String)> {
        let sensitivity = self.sensitivity.as_ref()?.id()?;
        let ids = self
            .compartments
            .iter()
            .map(Compartment::id)
            .collect::<Option<Vec<u64>>>()?;
        Some((sensitivity, compartment_key(&ids)))
    }
}

impl Default for Marking {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for Marking {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Marking::parse(s)
    }
}

/// Ascending, de-duplicated compartment ids joined with commas.
pub fn compartment_key(ids: &[u64]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}

fn validate_name(text: &str, name: &str) -> MacResult<()> {
    let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-');
    if let Some(bad) = name.chars().find(|c| !legal(*c)) {
        return Err(MacError::malformed(
            text,
            format!("illegal character '{}' in '{}'", bad, name),
        ));
    }
    Ok(())
}
