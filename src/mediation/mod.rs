//! Mediation: fan-out acquisition, transformation, and fan-in merging.
//!
//! A [`Mediator`] gathers information about one entity type from several
//! [`DataAcquirer`]s in parallel, converts each raw payload with the
//! acquirer's [`DataTransformer`], and unions the resulting fact sets. A
//! failing acquirer or transformer is logged and skipped; it never aborts its
//! siblings. The [`MediationManager`] runs whole [`MediationPlan`]s: every
//! mediator concurrently, one merged set, handed to the plan's integrator
//! only after all mediators have completed.

use std::sync::Arc;
use std::sync::mpsc;

use serde_json::Value;

use crate::error::{IntegrationError, IntegrationResult, MediationResult};
use crate::fact::FactSet;
use crate::integration::Integrator;
use crate::task::{TaskEnvelope, TaskManager};

// ---------------------------------------------------------------------------
// Source capability traits
// ---------------------------------------------------------------------------

/// Raw payload produced by an acquirer, before transformation.
#[derive(Debug, Clone)]
pub enum RawData {
    /// Textual payload (markup, CSV, WKT plans, ...).
    Text(String),
    /// Opaque binary payload.
    Bytes(Vec<u8>),
    /// Structured JSON payload.
    Json(Value),
}

/// Converts raw source payloads into fact sets.
pub trait DataTransformer: Send + Sync {
    /// Transform one payload into facts.
    fn transform(&self, raw: RawData) -> MediationResult<FactSet>;

    /// Release resources held by the transformer.
    fn close(&self) {}
}

/// Fetches raw data from one external source and knows its transformer.
pub trait DataAcquirer: Send + Sync {
    /// Fetch the raw payload. May block on I/O inside its own task slot.
    fn acquire(&self) -> MediationResult<RawData>;

    /// The transformer matching this acquirer's payload format.
    fn transformer(&self) -> Arc<dyn DataTransformer>;

    /// Release resources held by the acquirer.
    fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Fans out to a set of acquirers for one entity type and merges the results.
pub struct Mediator {
    acquirers: Vec<Arc<dyn DataAcquirer>>,
    tasks: TaskManager,
}

impl Mediator {
    /// Create a mediator over the given acquirers, scheduling on `tasks`.
    pub fn new(tasks: TaskManager, acquirers: Vec<Arc<dyn DataAcquirer>>) -> Self {
        Self { acquirers, tasks }
    }

    /// Number of acquirers this mediator fans out to.
    pub fn acquirer_count(&self) -> usize {
        self.acquirers.len()
    }

    /// Run the fan-out and block until every acquirer task has finished.
    ///
    /// Results are collected in completion order, not submission order. The
    /// returned set is the union of all successful transforms; individual
    /// failures are logged and skipped. The call itself fails only on
    /// external close or cancellation of the task manager.
    pub fn mediate(&self) -> MediationResult<FactSet> {
        let (tx, rx) = mpsc::channel::<MediationResult<FactSet>>();
        for acquirer in &self.acquirers {
            let acquirer = Arc::clone(acquirer);
            let tx = tx.clone();
            self.tasks.submit(TaskEnvelope::from_fn(move || {
                // Per-job errors are captured into the result value so a
                // failure never aborts sibling acquirers.
                let _ = tx.send(mediate_one(acquirer.as_ref()));
                Ok(())
            }))?;
        }
        drop(tx);

        let mut combined = FactSet::new();
        for _ in 0..self.acquirers.len() {
            match rx.recv() {
                Ok(Ok(facts)) => {
                    tracing::debug!(facts = facts.len(), "acquirer finished");
                    combined.merge(facts);
                }
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, "acquirer failed, skipping");
                }
                // Pool torn down under us before all results arrived.
                Err(_) => return Err(crate::error::TaskError::Cancelled.into()),
            }
        }
        Ok(combined)
    }

    /// Close every owned acquirer and release the task-manager reference.
    pub fn close(&self) {
        for acquirer in &self.acquirers {
            acquirer.close();
        }
        self.tasks.close();
    }
}

fn mediate_one(acquirer: &dyn DataAcquirer) -> MediationResult<FactSet> {
    let raw = acquirer.acquire()?;
    let transformer = acquirer.transformer();
    let facts = transformer.transform(raw);
    transformer.close();
    facts
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("acquirers", &self.acquirers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MediationPlan
// ---------------------------------------------------------------------------

/// Immutable association of mediators with the integrator that receives
/// their merged output. Owns both for its lifetime.
pub struct MediationPlan {
    mediators: Vec<Arc<Mediator>>,
    integrator: Arc<Integrator>,
}

impl MediationPlan {
    /// Create a plan over the given mediators and integrator.
    pub fn new(mediators: Vec<Arc<Mediator>>, integrator: Arc<Integrator>) -> Self {
        Self {
            mediators,
            integrator,
        }
    }

    /// The mediators of this plan.
    pub fn mediators(&self) -> &[Arc<Mediator>] {
        &self.mediators
    }

    /// The integrator receiving the merged output.
    pub fn integrator(&self) -> &Arc<Integrator> {
        &self.integrator
    }

    /// Close every owned mediator and the integrator.
    pub fn close(&self) {
        for mediator in &self.mediators {
            mediator.close();
        }
        self.integrator.close();
    }
}

// ---------------------------------------------------------------------------
// MediationManager
// ---------------------------------------------------------------------------

/// Runs mediation plans: all mediators concurrently, merged fan-in, one
/// integration call at the end.
pub struct MediationManager {
    tasks: TaskManager,
}

impl MediationManager {
    /// Create a manager scheduling on the given task manager.
    pub fn new(tasks: TaskManager) -> Self {
        Self { tasks }
    }

    /// Start the given plan and block until mediation and integration finish.
    ///
    /// There is no ordering between mediators; integration starts only after
    /// all of them have completed. A failed mediator is logged and skipped —
    /// the combined set is degraded, not abandoned.
    pub fn start_mediation(&self, plan: &MediationPlan) -> IntegrationResult<()> {
        if self.tasks.is_closed() {
            return Err(IntegrationError::Closed);
        }
        tracing::debug!(mediators = plan.mediators().len(), "starting mediation");

        let mut handles = Vec::with_capacity(plan.mediators().len());
        for mediator in plan.mediators() {
            let mediator = Arc::clone(mediator);
            handles.push(self.tasks.submit_with_result(move || mediator.mediate())?);
        }

        let mut combined = FactSet::new();
        for handle in handles {
            match handle.join() {
                Ok(Ok(facts)) => combined.merge(facts),
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, "mediator failed, skipping its output");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "mediation task cancelled");
                }
            }
        }

        tracing::debug!(facts = combined.len(), "mediation complete, integrating");
        plan.integrator().integrate(&combined)
    }

    /// Release the task-manager reference.
    pub fn close(&self) {
        self.tasks.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediationError as ME;
    use crate::fact::{Fact, Term};

    /// Acquirer yielding a fixed fact subject, optionally failing.
    struct FixedAcquirer {
        subject: &'static str,
        fail: bool,
    }

    struct LineTransformer;

    impl DataTransformer for LineTransformer {
        fn transform(&self, raw: RawData) -> MediationResult<FactSet> {
            match raw {
                RawData::Text(text) => Ok(text
                    .lines()
                    .map(|line| Fact::new(line, "urn:p", Term::iri("urn:o")))
                    .collect()),
                _ => Err(ME::Transform {
                    message: "expected text payload".into(),
                }),
            }
        }
    }

    impl DataAcquirer for FixedAcquirer {
        fn acquire(&self) -> MediationResult<RawData> {
            if self.fail {
                return Err(ME::Acquire {
                    message: format!("{} unreachable", self.subject),
                });
            }
            Ok(RawData::Text(self.subject.to_string()))
        }

        fn transformer(&self) -> Arc<dyn DataTransformer> {
            Arc::new(LineTransformer)
        }
    }

    fn acquirer(subject: &'static str, fail: bool) -> Arc<dyn DataAcquirer> {
        Arc::new(FixedAcquirer { subject, fail })
    }

    #[test]
    fn union_regardless_of_completion_order() {
        let tasks = TaskManager::new(4);
        let mediator = Mediator::new(
            tasks.clone(),
            vec![
                acquirer("urn:a", false),
                acquirer("urn:b", false),
                acquirer("urn:c", false),
            ],
        );

        let facts = mediator.mediate().unwrap();
        assert_eq!(facts.len(), 3);
        for subject in ["urn:a", "urn:b", "urn:c"] {
            assert!(facts.contains(&Fact::new(subject, "urn:p", Term::iri("urn:o"))));
        }
        mediator.close();
        tasks.close();
    }

    #[test]
    fn partial_failure_degrades_but_never_throws() {
        let tasks = TaskManager::new(4);
        let mediator = Mediator::new(
            tasks.clone(),
            vec![
                acquirer("urn:a", false),
                acquirer("urn:b", true),
                acquirer("urn:c", false),
            ],
        );

        let facts = mediator.mediate().unwrap();
        assert_eq!(facts.len(), 2);
        assert!(!facts.contains(&Fact::new("urn:b", "urn:p", Term::iri("urn:o"))));
        mediator.close();
        tasks.close();
    }

    #[test]
    fn mediate_on_closed_manager_fails() {
        let tasks = TaskManager::new(1);
        let mediator = Mediator::new(tasks.clone(), vec![acquirer("urn:a", false)]);
        tasks.force_shutdown();
        assert!(mediator.mediate().is_err());
    }

    #[test]
    fn transform_failure_is_contained() {
        struct BytesAcquirer;
        impl DataAcquirer for BytesAcquirer {
            fn acquire(&self) -> MediationResult<RawData> {
                Ok(RawData::Bytes(vec![0xff]))
            }
            fn transformer(&self) -> Arc<dyn DataTransformer> {
                Arc::new(LineTransformer) // rejects non-text payloads
            }
        }

        let tasks = TaskManager::new(2);
        let mediator = Mediator::new(
            tasks.clone(),
            vec![Arc::new(BytesAcquirer), acquirer("urn:a", false)],
        );
        let facts = mediator.mediate().unwrap();
        assert_eq!(facts.len(), 1);
        mediator.close();
        tasks.close();
    }
}
