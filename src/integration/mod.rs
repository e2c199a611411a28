//! Integration: update → link → clean pipelines and declarative routing.
//!
//! An [`Integrator`] applies a strict three-step state machine against one
//! target partition: the plan's updater persists the incoming facts, every
//! linker runs concurrently against the now-updated partition, and the
//! cleanser (if any) runs last over the whole partition. Linker output is
//! re-routed through partition routing rather than written directly, so
//! derived links land in whichever partition owns them.
//!
//! The [`IntegratorManager`] holds the routing table: one
//! [`SeparationRule`] per partition plus a default. `start_integration`
//! splits a combined set by the rules and dispatches one fire-and-forget
//! [`IntegrationTask`] per non-empty subset, without blocking on the
//! dispatched work.

mod separation;

pub use separation::SeparationRule;

use std::sync::mpsc;
use std::sync::{Arc, OnceLock, RwLock, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{IntegrationError, IntegrationResult, TaskError, TaskResult};
use crate::fact::FactSet;
use crate::store::{Access, Store};
use crate::task::{Task, TaskEnvelope, TaskManager};

// ---------------------------------------------------------------------------
// Pipeline capability traits
// ---------------------------------------------------------------------------

/// Primary updater: persists an incoming fact set into the target partition.
pub trait Update: Send + Sync {
    fn update(&self, partition: &str, facts: &FactSet) -> IntegrationResult<()>;

    /// Release resources held by the updater.
    fn close(&self) {}
}

/// Linker: derives new facts over the (already updated) target partition.
pub trait Link: Send + Sync {
    fn link(&self) -> IntegrationResult<FactSet>;

    /// Release resources held by the linker.
    fn close(&self) {}
}

/// Cleanser: final pass over the whole target partition.
pub trait Clean: Send + Sync {
    fn clean(&self, partition: &str) -> IntegrationResult<()>;

    /// Release resources held by the cleanser.
    fn close(&self) {}
}

/// Re-entry point for derived facts: linker output goes back through
/// partition routing instead of being written directly.
pub trait Router: Send + Sync {
    fn route(&self, facts: FactSet) -> IntegrationResult<()>;
}

// ---------------------------------------------------------------------------
// IntegrationPlan
// ---------------------------------------------------------------------------

/// Immutable ordered association of one optional updater, zero-or-more
/// linkers, and zero-or-one cleanser, scoped to one target partition.
pub struct IntegrationPlan {
    partition: String,
    updater: Option<Arc<dyn Update>>,
    linkers: Vec<Arc<dyn Link>>,
    cleanser: Option<Arc<dyn Clean>>,
}

impl IntegrationPlan {
    /// Start an empty plan for the given target partition.
    pub fn for_partition(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            updater: None,
            linkers: Vec::new(),
            cleanser: None,
        }
    }

    /// Set the primary updater.
    pub fn with_updater(mut self, updater: Arc<dyn Update>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Add a linker.
    pub fn with_linker(mut self, linker: Arc<dyn Link>) -> Self {
        self.linkers.push(linker);
        self
    }

    /// Set the cleanser.
    pub fn with_cleanser(mut self, cleanser: Arc<dyn Clean>) -> Self {
        self.cleanser = Some(cleanser);
        self
    }

    /// Target partition of this plan.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Release updater, cleanser, and every linker.
    pub fn close(&self) {
        if let Some(updater) = &self.updater {
            updater.close();
        }
        if let Some(cleanser) = &self.cleanser {
            cleanser.close();
        }
        for linker in &self.linkers {
            linker.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Provided updater
// ---------------------------------------------------------------------------

/// Updater that persists facts through the [`Store`] trait, stamping the
/// partition's modification time as a side effect of the add.
pub struct PartitionUpdater {
    store: Arc<dyn Store>,
}

impl PartitionUpdater {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Update for PartitionUpdater {
    fn update(&self, partition: &str, facts: &FactSet) -> IntegrationResult<()> {
        self.store.begin(Access::Write);
        match self.store.add_to_partition(partition, facts) {
            Ok(inserted) => {
                self.store.commit();
                tracing::debug!(partition = %partition, inserted, "update step persisted facts");
                Ok(())
            }
            Err(error) => {
                self.store.abort();
                Err(error.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Integrator
// ---------------------------------------------------------------------------

/// Applies update → link → clean against one target partition.
pub struct Integrator {
    plan: IntegrationPlan,
    tasks: TaskManager,
    router: OnceLock<Weak<dyn Router>>,
}

impl Integrator {
    /// Create an integrator executing the given plan on the shared pool.
    pub fn new(tasks: TaskManager, plan: IntegrationPlan) -> Self {
        Self {
            plan,
            tasks,
            router: OnceLock::new(),
        }
    }

    /// Name of the partition this integrator is responsible for.
    pub fn partition(&self) -> &str {
        self.plan.partition()
    }

    /// Bind the router that receives linker output. Set once, by whichever
    /// manager owns this integrator.
    pub fn bind_router(&self, router: Weak<dyn Router>) {
        let _ = self.router.set(router);
    }

    /// Run the pipeline for the given incoming facts.
    ///
    /// The update step fully completes before any linker starts, and all
    /// linkers finish before the cleanser runs. A linker failure is logged
    /// and its output dropped; update and clean failures propagate without
    /// rolling back earlier steps.
    pub fn integrate(&self, facts: &FactSet) -> IntegrationResult<()> {
        tracing::debug!(
            partition = %self.plan.partition(),
            facts = facts.len(),
            "integrate"
        );

        if let Some(updater) = &self.plan.updater {
            updater.update(self.plan.partition(), facts)?;
        }

        if !self.plan.linkers.is_empty() {
            self.run_linkers();
        }

        if let Some(cleanser) = &self.plan.cleanser {
            cleanser.clean(self.plan.partition())?;
        }
        Ok(())
    }

    /// Fan the linkers out on the pool and re-route each derived set as it
    /// completes. Blocks until every linker task has finished.
    fn run_linkers(&self) {
        let (tx, rx) = mpsc::channel::<IntegrationResult<FactSet>>();
        let mut submitted = 0usize;
        for linker in &self.plan.linkers {
            let linker = Arc::clone(linker);
            let tx = tx.clone();
            let outcome = self.tasks.submit(TaskEnvelope::from_fn(move || {
                let _ = tx.send(linker.link());
                Ok(())
            }));
            match outcome {
                Ok(_) => submitted += 1,
                Err(error) => {
                    tracing::warn!(error = %error, "could not schedule linker");
                }
            }
        }
        drop(tx);

        for _ in 0..submitted {
            match rx.recv() {
                Ok(Ok(derived)) if derived.is_empty() => {}
                Ok(Ok(derived)) => self.reroute(derived),
                Ok(Err(error)) => {
                    tracing::warn!(
                        partition = %self.plan.partition(),
                        error = %error,
                        "linker failed, dropping its output"
                    );
                }
                // A queued linker was skipped during shutdown.
                Err(_) => break,
            }
        }
    }

    fn reroute(&self, derived: FactSet) {
        let router = self.router.get().and_then(Weak::upgrade);
        match router {
            Some(router) => {
                tracing::debug!(facts = derived.len(), "re-routing linker output");
                if let Err(error) = router.route(derived) {
                    tracing::warn!(error = %error, "re-routing linker output failed");
                }
            }
            None => {
                tracing::warn!(
                    facts = derived.len(),
                    "no router bound, dropping linker output"
                );
            }
        }
    }

    /// Release updater, cleanser, every linker, and the pool reference.
    pub fn close(&self) {
        self.plan.close();
        self.tasks.close();
    }
}

impl std::fmt::Debug for Integrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrator")
            .field("partition", &self.plan.partition())
            .field("linkers", &self.plan.linkers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// IntegrationTask
// ---------------------------------------------------------------------------

/// Fire-and-forget wrapper running one integration on the pool.
pub struct IntegrationTask {
    integrator: Arc<Integrator>,
    facts: Option<FactSet>,
}

impl IntegrationTask {
    pub fn new(integrator: Arc<Integrator>, facts: FactSet) -> Self {
        Self {
            integrator,
            facts: Some(facts),
        }
    }
}

impl Task for IntegrationTask {
    fn execute(&mut self) -> TaskResult<()> {
        let facts = self.facts.take().unwrap_or_default();
        self.integrator
            .integrate(&facts)
            .map_err(|error| TaskError::Failed {
                message: error.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// IntegratorManager
// ---------------------------------------------------------------------------

struct RouteEntry {
    rule: SeparationRule,
    integrator: Arc<Integrator>,
}

#[derive(Default)]
struct RoutingTable {
    routes: Vec<RouteEntry>,
    default_integrator: Option<Arc<Integrator>>,
}

/// Splits combined fact sets by separation rules and dispatches one
/// integration per non-empty partition.
///
/// Routing reads take the table's shared lock and proceed concurrently;
/// rule reconfiguration and shutdown take the exclusive side.
pub struct IntegratorManager {
    table: RwLock<RoutingTable>,
    closed: AtomicBool,
    tasks: TaskManager,
}

impl IntegratorManager {
    /// Create an empty manager scheduling on the given pool.
    pub fn new(tasks: TaskManager) -> Arc<Self> {
        Arc::new(Self {
            table: RwLock::new(RoutingTable::default()),
            closed: AtomicBool::new(false),
            tasks,
        })
    }

    /// Register a partition: facts matching `rule` are integrated by an
    /// integrator running `plan`. Rules are evaluated in registration order.
    pub fn register(
        self: &Arc<Self>,
        rule: SeparationRule,
        plan: IntegrationPlan,
    ) -> Arc<Integrator> {
        let integrator = Arc::new(Integrator::new(self.tasks.clone(), plan));
        let this: Arc<dyn Router> = Arc::clone(self) as Arc<dyn Router>;
        let router: Weak<dyn Router> = Arc::downgrade(&this);
        integrator.bind_router(router);
        let mut table = self.table.write().expect("routing table lock poisoned");
        tracing::debug!(partition = %integrator.partition(), "registered routing rule");
        table.routes.push(RouteEntry {
            rule,
            integrator: Arc::clone(&integrator),
        });
        integrator
    }

    /// Set the integrator receiving the unmatched remainder.
    pub fn set_default(self: &Arc<Self>, plan: IntegrationPlan) -> Arc<Integrator> {
        let integrator = Arc::new(Integrator::new(self.tasks.clone(), plan));
        let this: Arc<dyn Router> = Arc::clone(self) as Arc<dyn Router>;
        let router: Weak<dyn Router> = Arc::downgrade(&this);
        integrator.bind_router(router);
        let mut table = self.table.write().expect("routing table lock poisoned");
        table.default_integrator = Some(Arc::clone(&integrator));
        integrator
    }

    /// Split the combined set by the routing rules and dispatch one
    /// integration task per non-empty subset.
    ///
    /// Every task is scheduled before this call returns, but the call never
    /// blocks on the dispatched work; per-partition failures surface
    /// asynchronously through the task's failure handler. Facts matching no
    /// rule are routed to the default partition.
    pub fn start_integration(&self, facts: FactSet) -> IntegrationResult<()> {
        let table = self.table.read().expect("routing table lock poisoned");
        if self.closed.load(Ordering::Acquire) {
            return Err(IntegrationError::Closed);
        }
        tracing::debug!(facts = facts.len(), "routing combined fact set");

        let mut remainder = facts;
        for entry in &table.routes {
            let matched = remainder.extract(&entry.rule);
            if matched.is_empty() {
                continue;
            }
            self.dispatch(Arc::clone(&entry.integrator), matched)?;
        }

        if !remainder.is_empty() {
            match &table.default_integrator {
                Some(integrator) => self.dispatch(Arc::clone(integrator), remainder)?,
                None => {
                    tracing::warn!(
                        facts = remainder.len(),
                        "no default integrator registered, dropping unmatched facts"
                    );
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, integrator: Arc<Integrator>, facts: FactSet) -> IntegrationResult<()> {
        let partition = integrator.partition().to_string();
        tracing::debug!(partition = %partition, facts = facts.len(), "dispatching integration");
        let envelope = TaskEnvelope::new(IntegrationTask::new(integrator, facts)).on_failure(
            move |error| {
                tracing::error!(partition = %partition, error = %error, "integration task failed");
            },
        );
        self.tasks
            .submit(envelope)
            .map(|_| ())
            .map_err(|_| IntegrationError::Closed)
    }

    /// Shut the manager down: close every integrator and reject further
    /// routing. Takes the table's exclusive lock, so no routing call can
    /// race past it.
    pub fn close(&self) {
        let table = self.table.write().expect("routing table lock poisoned");
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in &table.routes {
            entry.integrator.close();
        }
        if let Some(integrator) = &table.default_integrator {
            integrator.close();
        }
        drop(table);
        self.tasks.close();
        tracing::info!("integrator manager closed");
    }
}

impl Router for IntegratorManager {
    fn route(&self, facts: FactSet) -> IntegrationResult<()> {
        self.start_integration(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Fact, Term};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn fact(s: &str) -> Fact {
        Fact::new(s, "urn:p", Term::iri("urn:o"))
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(std::time::Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn updater(store: &Arc<MemoryStore>) -> Arc<dyn Update> {
        Arc::new(PartitionUpdater::new(
            Arc::clone(store) as Arc<dyn Store>
        ))
    }

    #[test]
    fn routes_by_rule_with_default_remainder() {
        let store = Arc::new(MemoryStore::new());
        let tasks = TaskManager::new(4);
        let manager = IntegratorManager::new(tasks.clone());
        manager.register(
            SeparationRule::SubjectPrefix("urn:spatial:".into()),
            IntegrationPlan::for_partition("spatial").with_updater(updater(&store)),
        );
        manager.set_default(
            IntegrationPlan::for_partition("default").with_updater(updater(&store)),
        );

        let combined: FactSet = (0..6)
            .map(|n| fact(&format!("urn:spatial:r{n}")))
            .chain((0..4).map(|n| fact(&format!("urn:other:x{n}"))))
            .collect();
        manager.start_integration(combined).unwrap();

        wait_for(|| store.fact_count() == 10);
        assert_eq!(store.partition("spatial").unwrap().len(), 6);
        assert_eq!(store.partition("default").unwrap().len(), 4);

        manager.close();
        tasks.close();
    }

    #[test]
    fn routing_after_close_is_rejected() {
        let tasks = TaskManager::new(1);
        let manager = IntegratorManager::new(tasks.clone());
        manager.close();
        let result = manager.start_integration([fact("urn:a")].into_iter().collect());
        assert!(matches!(result, Err(IntegrationError::Closed)));
        tasks.close();
    }

    #[test]
    fn empty_matches_dispatch_nothing() {
        let store = Arc::new(MemoryStore::new());
        let tasks = TaskManager::new(2);
        let manager = IntegratorManager::new(tasks.clone());
        manager.register(
            SeparationRule::SubjectPrefix("urn:spatial:".into()),
            IntegrationPlan::for_partition("spatial").with_updater(updater(&store)),
        );
        manager.set_default(
            IntegrationPlan::for_partition("default").with_updater(updater(&store)),
        );

        manager.start_integration([fact("urn:other:a")].into_iter().collect()).unwrap();
        wait_for(|| store.fact_count() == 1);
        // The spatial partition never saw a dispatch.
        assert!(store.partition("spatial").is_none());

        manager.close();
        tasks.close();
    }

    #[test]
    fn update_runs_before_linkers_and_clean_runs_last() {
        use std::sync::Mutex;

        #[derive(Clone)]
        struct Trace(Arc<Mutex<Vec<&'static str>>>);

        struct TracingUpdate(Trace);
        impl Update for TracingUpdate {
            fn update(&self, _partition: &str, _facts: &FactSet) -> IntegrationResult<()> {
                self.0.0.lock().unwrap().push("update");
                Ok(())
            }
        }
        struct TracingLink(Trace);
        impl Link for TracingLink {
            fn link(&self) -> IntegrationResult<FactSet> {
                self.0.0.lock().unwrap().push("link");
                Ok(FactSet::new())
            }
        }
        struct TracingClean(Trace);
        impl Clean for TracingClean {
            fn clean(&self, _partition: &str) -> IntegrationResult<()> {
                self.0.0.lock().unwrap().push("clean");
                Ok(())
            }
        }

        let trace = Trace(Arc::new(Mutex::new(Vec::new())));
        let tasks = TaskManager::new(4);
        let integrator = Integrator::new(
            tasks.clone(),
            IntegrationPlan::for_partition("spatial")
                .with_updater(Arc::new(TracingUpdate(trace.clone())))
                .with_linker(Arc::new(TracingLink(trace.clone())))
                .with_linker(Arc::new(TracingLink(trace.clone())))
                .with_cleanser(Arc::new(TracingClean(trace.clone()))),
        );

        integrator.integrate(&[fact("urn:a")].into_iter().collect()).unwrap();

        let order = trace.0.lock().unwrap().clone();
        assert_eq!(order.first(), Some(&"update"));
        assert_eq!(order.last(), Some(&"clean"));
        assert_eq!(order.iter().filter(|s| **s == "link").count(), 2);

        integrator.close();
        tasks.close();
    }

    #[test]
    fn linker_failure_is_logged_and_dropped() {
        struct FailingLink;
        impl Link for FailingLink {
            fn link(&self) -> IntegrationResult<FactSet> {
                Err(IntegrationError::Link {
                    message: "no matches".into(),
                })
            }
        }

        let store = Arc::new(MemoryStore::new());
        let tasks = TaskManager::new(2);
        let integrator = Integrator::new(
            tasks.clone(),
            IntegrationPlan::for_partition("spatial")
                .with_updater(updater(&store))
                .with_linker(Arc::new(FailingLink)),
        );

        let result = integrator.integrate(&[fact("urn:a")].into_iter().collect());
        assert!(result.is_ok());
        assert_eq!(store.partition("spatial").unwrap().len(), 1);

        integrator.close();
        tasks.close();
    }

    #[test]
    fn linker_output_is_rerouted_through_partitioning() {
        struct DerivingLink;
        impl Link for DerivingLink {
            fn link(&self) -> IntegrationResult<FactSet> {
                Ok([fact("urn:org:derived")].into_iter().collect())
            }
        }

        let store = Arc::new(MemoryStore::new());
        let tasks = TaskManager::new(4);
        let manager = IntegratorManager::new(tasks.clone());
        manager.register(
            SeparationRule::SubjectPrefix("urn:spatial:".into()),
            IntegrationPlan::for_partition("spatial")
                .with_updater(updater(&store))
                .with_linker(Arc::new(DerivingLink)),
        );
        manager.register(
            SeparationRule::SubjectPrefix("urn:org:".into()),
            IntegrationPlan::for_partition("organizational").with_updater(updater(&store)),
        );

        manager
            .start_integration([fact("urn:spatial:r1")].into_iter().collect())
            .unwrap();

        // The derived fact crosses partitions: the spatial linker produced
        // it, routing placed it in the organizational partition.
        wait_for(|| {
            store
                .partition("organizational")
                .is_some_and(|p| p.contains(&fact("urn:org:derived")))
        });
        assert_eq!(store.partition("spatial").unwrap().len(), 1);

        manager.close();
        tasks.close();
    }
}
