//! Store abstraction: the external partition/transaction collaborator.
//!
//! The core never owns persistence. It assumes a [`Store`] that hands out
//! [`Partition`] handles, supports add/remove/replace of whole partitions,
//! and provides a begin/commit/abort transaction discipline. [`MemoryStore`]
//! is the in-memory reference implementation backed by a sharded map; real
//! deployments wire an adapter over their triple store here.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{StoreError, StoreResult};
use crate::fact::FactSet;
use crate::partition::Partition;

/// Access mode for a store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// The partitioned graph store the core integrates into.
///
/// Mutation notification happens through each partition's version counter,
/// not through this trait. Replacing a partition installs a *new* handle:
/// observers that kept the old `Arc` see a stale object and re-resolve.
pub trait Store: Send + Sync {
    /// Begin a transaction. Default is a no-op for stores without one.
    fn begin(&self, _access: Access) {}

    /// Commit the current transaction. Default no-op.
    fn commit(&self) {}

    /// Abort the current transaction. Default no-op.
    fn abort(&self) {}

    /// Look up an existing partition.
    fn partition(&self, name: &str) -> Option<Arc<Partition>>;

    /// Get the named partition, creating an empty one if missing.
    fn open_partition(&self, name: &str) -> Arc<Partition>;

    /// Add facts to the named partition, creating it if missing.
    ///
    /// Returns the number of facts that were not already present.
    fn add_to_partition(&self, name: &str, facts: &FactSet) -> StoreResult<usize>;

    /// Drop the named partition entirely.
    fn remove_partition(&self, name: &str) -> StoreResult<()>;

    /// Replace the named partition's content wholesale, installing a fresh
    /// handle. Returns the new handle.
    fn replace_partition(&self, name: &str, facts: FactSet) -> StoreResult<Arc<Partition>>;

    /// Names of all existing partitions.
    fn partition_names(&self) -> Vec<String>;
}

/// Concurrent in-memory store using a sharded hashmap of partitions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: DashMap<String, Arc<Partition>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total fact count across all partitions.
    pub fn fact_count(&self) -> usize {
        self.partitions.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Store for MemoryStore {
    fn partition(&self, name: &str) -> Option<Arc<Partition>> {
        self.partitions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn open_partition(&self, name: &str) -> Arc<Partition> {
        Arc::clone(
            self.partitions
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Partition::new(name)))
                .value(),
        )
    }

    fn add_to_partition(&self, name: &str, facts: &FactSet) -> StoreResult<usize> {
        let partition = self.open_partition(name);
        let inserted = partition.add(facts);
        tracing::debug!(
            partition = %name,
            inserted,
            total = partition.len(),
            "added facts to partition"
        );
        Ok(inserted)
    }

    fn remove_partition(&self, name: &str) -> StoreResult<()> {
        self.partitions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::PartitionNotFound {
                name: name.to_string(),
            })
    }

    fn replace_partition(&self, name: &str, facts: FactSet) -> StoreResult<Arc<Partition>> {
        let fresh = Arc::new(Partition::with_facts(name, facts));
        self.partitions.insert(name.to_string(), Arc::clone(&fresh));
        tracing::debug!(partition = %name, facts = fresh.len(), "replaced partition");
        Ok(fresh)
    }

    fn partition_names(&self) -> Vec<String> {
        self.partitions.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Fact, Term};

    fn facts(subjects: &[&str]) -> FactSet {
        subjects
            .iter()
            .map(|s| Fact::new(*s, "urn:p", Term::iri("urn:o")))
            .collect()
    }

    #[test]
    fn open_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.open_partition("spatial");
        let second = store.open_partition("spatial");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn add_creates_missing_partition() {
        let store = MemoryStore::new();
        let inserted = store.add_to_partition("spatial", &facts(&["urn:a", "urn:b"])).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.partition("spatial").unwrap().len(), 2);
    }

    #[test]
    fn remove_missing_partition_is_an_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.remove_partition("nope"),
            Err(StoreError::PartitionNotFound { .. })
        ));
    }

    #[test]
    fn replace_installs_a_fresh_handle() {
        let store = MemoryStore::new();
        let old = store.open_partition("spatial");
        store.add_to_partition("spatial", &facts(&["urn:a"])).unwrap();

        let fresh = store.replace_partition("spatial", facts(&["urn:b"])).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.len(), 1);
        // The stale handle still sees the old content; new lookups do not.
        assert_eq!(old.len(), 1);
        assert!(Arc::ptr_eq(&store.partition("spatial").unwrap(), &fresh));
    }

    #[test]
    fn fact_count_spans_partitions() {
        let store = MemoryStore::new();
        store.add_to_partition("a", &facts(&["urn:1"])).unwrap();
        store.add_to_partition("b", &facts(&["urn:2", "urn:3"])).unwrap();
        assert_eq!(store.fact_count(), 3);
    }
}
