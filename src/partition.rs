//! Named partitions: independently queryable and mutable regions of the store.
//!
//! A [`Partition`] is a shared handle over a base [`FactSet`] plus an atomic
//! version counter that is bumped on every mutating call. The counter is the
//! change-notification mechanism consumed by the inference cache: instead of
//! attaching listeners, observers remember the version they last saw and
//! compare it against the current one.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fact::{Fact, FactSet};

/// A named, versioned region of the store.
pub struct Partition {
    name: String,
    facts: RwLock<FactSet>,
    /// Bumped on every mutating call.
    version: AtomicU64,
    /// Seconds since UNIX epoch of the last mutation, 0 if never mutated.
    modified_at: AtomicU64,
}

impl Partition {
    /// Create an empty partition with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_facts(name, FactSet::new())
    }

    /// Create a partition pre-populated with the given base set.
    pub fn with_facts(name: impl Into<String>, facts: FactSet) -> Self {
        Self {
            name: name.into(),
            facts: RwLock::new(facts),
            version: AtomicU64::new(0),
            modified_at: AtomicU64::new(0),
        }
    }

    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current mutation counter value.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Seconds since UNIX epoch of the last mutation, 0 if never mutated.
    pub fn modified_at(&self) -> u64 {
        self.modified_at.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.modified_at.store(now, Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Add all facts of the given set to the base, bumping the version.
    ///
    /// Returns the number of facts that were not already present.
    pub fn add(&self, facts: &FactSet) -> usize {
        let mut base = self.facts.write().expect("partition lock poisoned");
        let before = base.len();
        base.extend(facts.iter().cloned());
        let inserted = base.len() - before;
        drop(base);
        self.touch();
        inserted
    }

    /// Remove all facts of the given set from the base, bumping the version.
    ///
    /// Returns the number of facts actually removed.
    pub fn remove(&self, facts: &FactSet) -> usize {
        let mut base = self.facts.write().expect("partition lock poisoned");
        let before = base.len();
        let remaining: FactSet = base.iter().filter(|f| !facts.contains(f)).cloned().collect();
        let removed = before - remaining.len();
        *base = remaining;
        drop(base);
        self.touch();
        removed
    }

    /// Whether the base contains the given fact.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts
            .read()
            .expect("partition lock poisoned")
            .contains(fact)
    }

    /// Number of facts in the base.
    pub fn len(&self) -> usize {
        self.facts.read().expect("partition lock poisoned").len()
    }

    /// Whether the base is empty.
    pub fn is_empty(&self) -> bool {
        self.facts.read().expect("partition lock poisoned").is_empty()
    }

    /// Clone of the current base set.
    pub fn snapshot(&self) -> FactSet {
        self.facts.read().expect("partition lock poisoned").clone()
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .field("facts", &self.len())
            .field("version", &self.version())
            .finish()
    }
}
