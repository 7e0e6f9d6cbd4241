//! Dominance between sensitivities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Total order deciding which sensitivity dominates another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominanceOrder {
    /// `a` dominates `b` iff `a`'s name sorts after `b`'s.
    #[default]
    Alphabetical,
    /// Explicit ranking, lowest first. A name missing from the ranking
    /// neither dominates nor is dominated.
    Ranked(Vec<String>),
}

impl DominanceOrder {
    /// Build a ranking from names, lowest first.
    pub fn ranked<S: AsRef<str>>(levels: impl IntoIterator<Item = S>) -> Self {
        DominanceOrder::Ranked(
            levels
                .into_iter()
                .map(|s| s.as_ref().trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Whether sensitivity `a` strictly dominates sensitivity `b`.
    pub fn dominates(&self, a: &str, b: &str) -> bool {
        match self {
            DominanceOrder::Alphabetical => a > b,
            DominanceOrder::Ranked(levels) => {
                let rank = |name: &str| levels.iter().position(|l| l.eq_ignore_ascii_case(name));
                match (rank(a), rank(b)) {
                    (Some(ra), Some(rb)) => ra > rb,
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for DominanceOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DominanceOrder::Alphabetical => write!(f, "alphabetical"),
            DominanceOrder::Ranked(levels) => write!(f, "{}", levels.join(",")),
        }
    }
}

impl FromStr for DominanceOrder {
    type Err = String;

    /// `alphabetical`, or a comma-separated ranking such as
    /// `UNCLASSIFIED,CONFIDENTIAL,SECRET,TOP SECRET`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("alphabetical") {
            return Ok(DominanceOrder::Alphabetical);
        }
        let order = DominanceOrder::ranked(s.split(','));
        match &order {
            DominanceOrder::Ranked(levels) if levels.len() >= 2 => Ok(order),
            _ => Err(format!(
                "dominance order must be 'alphabetical' or at least two comma-separated levels, got '{}'",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabetical() {
        let order = DominanceOrder::Alphabetical;
        assert!(order.dominates("BETA", "ALPHA"));
        assert!(!order.dominates("ALPHA", "BETA"));
        assert!(!order.dominates("ALPHA", "ALPHA"));
    }

    #[test]
    fn test_ranked() {
        let order: DominanceOrder = "unclassified, secret, top secret".parse().unwrap();
        assert!(order.dominates("TOP SECRET", "UNCLASSIFIED"));
        assert!(order.dominates("SECRET", "UNCLASSIFIED"));
        assert!(!order.dominates("UNCLASSIFIED", "SECRET"));
        // Unknown names are incomparable
        assert!(!order.dominates("COSMIC", "SECRET"));
        assert!(!order.dominates("SECRET", "COSMIC"));
    }

    #[test]
    fn test_parse() {
        assert_eq!("Alphabetical".parse::<DominanceOrder>(), Ok(DominanceOrder::Alphabetical));
        assert!("SECRET".parse::<DominanceOrder>().is_err());
        assert_eq!(
            "LOW,HIGH".parse::<DominanceOrder>().unwrap().to_string(),
            "LOW,HIGH"
        );
    }
}
