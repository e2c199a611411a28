//! Fact data model: subject–predicate–object assertions and deduplicated sets.
//!
//! A [`Fact`] is an immutable assertion whose object position is a [`Term`]:
//! either a reference to another resource or a typed / language-tagged
//! literal. [`FactSet`] is the unit of exchange between acquisition,
//! integration, and inference — a deduplicated, order-irrelevant collection
//! that can optionally be scoped to a named partition.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::integration::SeparationRule;

/// The object position of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Term {
    /// Reference to another resource by IRI.
    Iri { iri: String },
    /// Literal value with optional datatype IRI or language tag.
    Literal {
        lexical: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    /// Reference term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri { iri: iri.into() }
    }

    /// Plain literal without datatype or language tag.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// Literal with an explicit datatype IRI.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// Language-tagged literal.
    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// Whether this term is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri { iri } => write!(f, "<{iri}>"),
            Self::Literal {
                lexical,
                datatype,
                language,
            } => {
                write!(f, "\"{lexical}\"")?;
                if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")?;
                }
                if let Some(lang) = language {
                    write!(f, "@{lang}")?;
                }
                Ok(())
            }
        }
    }
}

/// An immutable (subject, predicate, object) assertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// Subject IRI.
    pub subject: String,
    /// Predicate IRI.
    pub predicate: String,
    /// Object term.
    pub object: Term,
}

impl Fact {
    /// Create a new fact.
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {}", self.subject, self.predicate, self.object)
    }
}

/// A deduplicated, order-irrelevant collection of facts.
///
/// Optionally scoped to a partition name; the scope is advisory metadata for
/// callers that hand a set to a specific partition, it does not affect set
/// membership or equality of the contained facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSet {
    facts: HashSet<Fact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

impl FactSet {
    /// Create an empty, unscoped fact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty fact set scoped to a partition name.
    pub fn scoped(partition: impl Into<String>) -> Self {
        Self {
            facts: HashSet::new(),
            scope: Some(partition.into()),
        }
    }

    /// The partition this set is scoped to, if any.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Insert a fact. Returns `true` if the fact was not already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        self.facts.insert(fact)
    }

    /// Whether the set contains the given fact.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    /// Number of distinct facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Union another set into this one, consuming it.
    pub fn merge(&mut self, other: FactSet) {
        self.facts.extend(other.facts);
    }

    /// Remove and return every fact matching the given separation rule.
    ///
    /// The returned set and the remainder are disjoint; together they hold
    /// exactly the facts this set held before the call.
    pub fn extract(&mut self, rule: &SeparationRule) -> FactSet {
        let (matched, rest): (HashSet<Fact>, HashSet<Fact>) =
            self.facts.drain().partition(|fact| rule.matches(fact));
        self.facts = rest;
        FactSet {
            facts: matched,
            scope: None,
        }
    }

    /// Iterate over the contained facts.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }
}

impl FromIterator<Fact> for FactSet {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        Self {
            facts: iter.into_iter().collect(),
            scope: None,
        }
    }
}

impl IntoIterator for FactSet {
    type Item = Fact;
    type IntoIter = std::collections::hash_set::IntoIter<Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.into_iter()
    }
}

impl Extend<Fact> for FactSet {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        self.facts.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(s: &str, p: &str, o: &str) -> Fact {
        Fact::new(s, p, Term::iri(o))
    }

    #[test]
    fn deduplication() {
        let mut set = FactSet::new();
        assert!(set.insert(fact("urn:a", "urn:p", "urn:b")));
        assert!(!set.insert(fact("urn:a", "urn:p", "urn:b")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn merge_is_union() {
        let mut left: FactSet = [fact("urn:a", "urn:p", "urn:b")].into_iter().collect();
        let right: FactSet = [
            fact("urn:a", "urn:p", "urn:b"),
            fact("urn:c", "urn:p", "urn:d"),
        ]
        .into_iter()
        .collect();
        left.merge(right);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn extract_partitions_exactly() {
        let mut set: FactSet = [
            fact("urn:spatial:room1", "urn:p", "urn:x"),
            fact("urn:spatial:room2", "urn:p", "urn:y"),
            fact("urn:org:unit1", "urn:p", "urn:z"),
        ]
        .into_iter()
        .collect();

        let rule = SeparationRule::SubjectPrefix("urn:spatial:".into());
        let matched = set.extract(&rule);

        assert_eq!(matched.len(), 2);
        assert_eq!(set.len(), 1);
        assert!(matched.iter().all(|f| f.subject.starts_with("urn:spatial:")));
    }

    #[test]
    fn literal_terms_distinct_from_iris() {
        let mut set = FactSet::new();
        set.insert(Fact::new("urn:a", "urn:label", Term::literal("b")));
        set.insert(Fact::new("urn:a", "urn:label", Term::iri("b")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn serde_round_trip() {
        let set: FactSet = [Fact::new(
            "urn:a",
            "urn:label",
            Term::tagged("Hauptgebäude", "de"),
        )]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&set).unwrap();
        let back: FactSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }

    #[test]
    fn scope_is_advisory() {
        let mut scoped = FactSet::scoped("spatial");
        scoped.insert(fact("urn:a", "urn:p", "urn:b"));
        assert_eq!(scoped.scope(), Some("spatial"));
        assert_eq!(scoped.len(), 1);
    }
}
