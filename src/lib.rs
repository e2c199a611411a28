//! # factweave
//!
//! A concurrent orchestration core for fact-based data management: ingest
//! heterogeneous sources, convert their output into a common fact
//! representation, merge and route the facts into a partitioned store, and
//! serve cached derived views that stay consistent under concurrent
//! mutation.
//!
//! ## Architecture
//!
//! - **Task execution** (`task`): bounded worker pool with task lifecycle,
//!   close/failure handlers, and reference-counted shutdown
//! - **Mediation** (`mediation`): fan-out acquisition and transformation,
//!   completion-ordered fan-in tolerant of partial failure
//! - **Integration** (`integration`): update → link → clean pipelines and
//!   declarative partition routing
//! - **Inference** (`infer`): per-partition memoized derived views,
//!   invalidated by mutation rather than recomputed on every read
//! - **Store** (`store`): the external partition/transaction collaborator,
//!   with an in-memory reference implementation
//!
//! ## Library usage
//!
//! ```
//! use std::sync::Arc;
//! use factweave::engine::{Engine, EngineConfig};
//! use factweave::fact::{Fact, FactSet, Term};
//! use factweave::infer::EntailmentRules;
//! use factweave::store::MemoryStore;
//!
//! let rules: Arc<dyn EntailmentRules> = Arc::new(|base: &FactSet| base.clone());
//! let engine = Engine::new(Arc::new(MemoryStore::new()), rules, EngineConfig::default()).unwrap();
//! let facts: FactSet = [Fact::new("urn:a", "urn:p", Term::iri("urn:b"))].into_iter().collect();
//! engine.start_integration(facts).unwrap();
//! engine.close();
//! ```

pub mod engine;
pub mod error;
pub mod fact;
pub mod infer;
pub mod integration;
pub mod mediation;
pub mod partition;
pub mod store;
pub mod task;
