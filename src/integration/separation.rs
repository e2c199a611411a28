//! Declarative separation rules: which partition owns a fact.
//!
//! A rule is a pure predicate over a single fact. The routing table pairs
//! each partition with one rule; rules plus the default partition fully
//! determine where every fact of a combined set ends up.

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, Term};

/// Predicate mapping a fact to its owning partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value")]
pub enum SeparationRule {
    /// Matches facts whose subject IRI starts with the given prefix.
    /// This is the classic namespace split: every resource minted under a
    /// dataset's namespace belongs to that dataset's partition.
    SubjectPrefix(String),
    /// Matches facts whose predicate IRI starts with the given prefix.
    PredicatePrefix(String),
    /// Matches facts with exactly the given predicate IRI.
    Predicate(String),
    /// Matches facts whose object is a reference with the given prefix.
    /// Useful for routing link assertions to the partition of their target.
    ObjectPrefix(String),
}

impl SeparationRule {
    /// Whether the given fact belongs to this rule's partition.
    pub fn matches(&self, fact: &Fact) -> bool {
        match self {
            Self::SubjectPrefix(prefix) => fact.subject.starts_with(prefix),
            Self::PredicatePrefix(prefix) => fact.predicate.starts_with(prefix),
            Self::Predicate(predicate) => fact.predicate == *predicate,
            Self::ObjectPrefix(prefix) => match &fact.object {
                Term::Iri { iri } => iri.starts_with(prefix),
                Term::Literal { .. } => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_prefix() {
        let rule = SeparationRule::SubjectPrefix("urn:spatial:".into());
        assert!(rule.matches(&Fact::new("urn:spatial:r1", "urn:p", Term::iri("urn:x"))));
        assert!(!rule.matches(&Fact::new("urn:org:u1", "urn:p", Term::iri("urn:x"))));
    }

    #[test]
    fn exact_predicate() {
        let rule = SeparationRule::Predicate("urn:locatedIn".into());
        assert!(rule.matches(&Fact::new("urn:a", "urn:locatedIn", Term::iri("urn:b"))));
        assert!(!rule.matches(&Fact::new("urn:a", "urn:locatedInside", Term::iri("urn:b"))));
    }

    #[test]
    fn object_prefix_ignores_literals() {
        let rule = SeparationRule::ObjectPrefix("urn:spatial:".into());
        assert!(rule.matches(&Fact::new("urn:a", "urn:p", Term::iri("urn:spatial:b"))));
        assert!(!rule.matches(&Fact::new("urn:a", "urn:p", Term::literal("urn:spatial:b"))));
    }
}
