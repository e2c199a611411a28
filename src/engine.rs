//! Engine facade: top-level API wiring the orchestration subsystems.
//!
//! The `Engine` owns the shared task manager, the mediation and integration
//! managers, and the inference cache, all over one injected [`Store`]. Every
//! concurrent operation — acquisition fan-out, link fan-out, partition
//! dispatch — borrows slots from the same fixed-size pool.

use std::sync::Arc;

use crate::error::{CacheResult, EngineError, IntegrationResult, WeaveResult};
use crate::fact::FactSet;
use crate::infer::{EntailmentRules, InferenceCache};
use crate::integration::{
    IntegrationPlan, Integrator, IntegratorManager, PartitionUpdater, SeparationRule,
};
use crate::mediation::{DataAcquirer, MediationManager, MediationPlan, Mediator};
use crate::store::Store;
use crate::task::TaskManager;

/// Configuration for the factweave engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads in the shared pool.
    pub workers: usize,
    /// Partition receiving facts that match no separation rule.
    pub default_partition: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            default_partition: "default".into(),
        }
    }
}

/// The factweave orchestration engine.
///
/// Owns the shared pool and the managers; the store and the entailment
/// ruleset are injected collaborators.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    tasks: TaskManager,
    mediation: MediationManager,
    integration: Arc<IntegratorManager>,
    cache: InferenceCache,
}

impl Engine {
    /// Create a new engine over the given store and ruleset.
    pub fn new(
        store: Arc<dyn Store>,
        rules: Arc<dyn EntailmentRules>,
        config: EngineConfig,
    ) -> WeaveResult<Self> {
        if config.workers == 0 {
            return Err(EngineError::InvalidConfig {
                message: "workers must be > 0".into(),
            }
            .into());
        }
        if config.default_partition.is_empty() {
            return Err(EngineError::InvalidConfig {
                message: "default_partition must not be empty".into(),
            }
            .into());
        }

        tracing::info!(
            workers = config.workers,
            default_partition = %config.default_partition,
            "initializing factweave engine"
        );

        let tasks = TaskManager::new(config.workers);
        let integration = IntegratorManager::new(tasks.clone());
        integration.set_default(
            IntegrationPlan::for_partition(&config.default_partition)
                .with_updater(Arc::new(PartitionUpdater::new(Arc::clone(&store)))),
        );
        let mediation = MediationManager::new(tasks.clone());
        let cache = InferenceCache::new(Arc::clone(&store), rules);

        Ok(Self {
            config,
            store,
            tasks,
            mediation,
            integration,
            cache,
        })
    }

    /// The injected store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The shared task manager. Clone it to take an ownership reference.
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// The inference cache.
    pub fn cache(&self) -> &InferenceCache {
        &self.cache
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a routed partition: facts matching `rule` are handled by an
    /// integrator running `plan`.
    pub fn register_partition(
        &self,
        rule: SeparationRule,
        plan: IntegrationPlan,
    ) -> Arc<Integrator> {
        self.integration.register(rule, plan)
    }

    /// Build a mediator over the given acquirers, scheduling on the shared
    /// pool. The caller owns it and closes it.
    pub fn mediator(&self, acquirers: Vec<Arc<dyn DataAcquirer>>) -> Mediator {
        Mediator::new(self.tasks.clone(), acquirers)
    }

    /// Run a mediation plan to completion (blocking).
    pub fn start_mediation(&self, plan: &MediationPlan) -> IntegrationResult<()> {
        self.mediation.start_mediation(plan)
    }

    /// Route a combined fact set through partitioning (non-blocking dispatch).
    pub fn start_integration(&self, facts: FactSet) -> IntegrationResult<()> {
        self.integration.start_integration(facts)
    }

    /// The cached derived view of the named partition.
    pub fn inferred(&self, partition: &str) -> CacheResult<Arc<FactSet>> {
        self.cache.get(partition)
    }

    /// Summary of the engine state.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            workers: self.config.workers,
            partitions: self.store.partition_names().len(),
            cached_views: self.cache.len(),
            closed: self.tasks.is_closed(),
        }
    }

    /// Release the engine-owned references: the integration manager (and its
    /// integrators), the mediation manager, and the engine's own pool
    /// reference. The pool shuts down once every outside owner has released
    /// too.
    pub fn close(&self) {
        self.integration.close();
        self.mediation.close();
        self.tasks.close();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub workers: usize,
    pub partitions: usize,
    pub cached_views: usize,
    pub closed: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "factweave engine info")?;
        writeln!(f, "  workers:      {}", self.workers)?;
        writeln!(f, "  partitions:   {}", self.partitions)?;
        writeln!(f, "  cached views: {}", self.cached_views)?;
        writeln!(f, "  closed:       {}", self.closed)?;
        Ok(())
    }
}
