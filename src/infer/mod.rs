//! Inference cache: memoized derived views over partition bases.
//!
//! Recomputing a derived (entailed) view on every read is wasteful; the
//! cache keeps one entry per partition and recomputes only when the
//! partition's base has actually mutated. Freshness is decided by the
//! partition's version counter: an entry remembers the version it derived
//! from and is stale as soon as the counter moves on — or as soon as the
//! store has installed a fresh partition handle under the same name.
//!
//! The ruleset is an opaque collaborator. The core hands it the base set and
//! stores whatever comes back; it never inspects rule content.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{CacheError, CacheResult};
use crate::fact::FactSet;
use crate::partition::Partition;
use crate::store::Store;

/// Opaque entailment ruleset applied uniformly to every partition base.
pub trait EntailmentRules: Send + Sync {
    /// Compute the derived view of the given base set.
    fn entail(&self, base: &FactSet) -> FactSet;
}

impl<F> EntailmentRules for F
where
    F: Fn(&FactSet) -> FactSet + Send + Sync,
{
    fn entail(&self, base: &FactSet) -> FactSet {
        self(base)
    }
}

struct CacheEntry {
    /// The partition handle this entry derived from. A replaced partition
    /// installs a new handle, which makes this entry stale by identity.
    partition: Arc<Partition>,
    /// Version of the base observed before the derivation.
    derived_from: u64,
    derived: Arc<FactSet>,
}

impl CacheEntry {
    fn is_fresh(&self, current: &Arc<Partition>) -> bool {
        Arc::ptr_eq(&self.partition, current) && self.derived_from == current.version()
    }
}

/// Per-partition memoization of derived fact sets.
///
/// Reads take the entry map's shared lock; recomputation and entry
/// replacement take the exclusive side, so no reader ever observes a
/// half-updated entry.
pub struct InferenceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    store: Arc<dyn Store>,
    rules: Arc<dyn EntailmentRules>,
}

impl InferenceCache {
    /// Create a cache deriving over the given store with the given ruleset.
    pub fn new(store: Arc<dyn Store>, rules: Arc<dyn EntailmentRules>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            rules,
        }
    }

    /// The derived view of the named partition.
    ///
    /// Between two observed mutations of the partition's base, every call
    /// returns the identical, unrecomputed `Arc`. A mutation (or a replaced
    /// partition handle) makes the next call recompute exactly once.
    pub fn get(&self, partition_name: &str) -> CacheResult<Arc<FactSet>> {
        let partition =
            self.store
                .partition(partition_name)
                .ok_or_else(|| CacheError::PartitionNotFound {
                    name: partition_name.to_string(),
                })?;

        {
            let entries = self.entries.read().expect("cache lock poisoned");
            if let Some(entry) = entries.get(partition_name) {
                if entry.is_fresh(&partition) {
                    return Ok(Arc::clone(&entry.derived));
                }
            }
        }

        let mut entries = self.entries.write().expect("cache lock poisoned");
        // Another writer may have refreshed the entry while we waited for
        // the exclusive lock; recompute at most once per observed mutation.
        if let Some(entry) = entries.get(partition_name) {
            if entry.is_fresh(&partition) {
                return Ok(Arc::clone(&entry.derived));
            }
        }

        // Read the version before snapshotting the base: a mutation landing
        // in between leaves the entry stale and the next get recomputes.
        let derived_from = partition.version();
        let base = partition.snapshot();
        tracing::debug!(
            partition = %partition_name,
            base = base.len(),
            version = derived_from,
            "recomputing derived view"
        );
        let derived = Arc::new(self.rules.entail(&base));
        entries.insert(
            partition_name.to_string(),
            CacheEntry {
                partition,
                derived_from,
                derived: Arc::clone(&derived),
            },
        );
        Ok(derived)
    }

    /// Drop the entry for the named partition, if any.
    pub fn remove(&self, partition_name: &str) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(partition_name);
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceCache")
            .field("entries", &self.len())
            .finish()
    }
}
