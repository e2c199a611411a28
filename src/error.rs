//! Rich diagnostic error types for the factweave core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes, help text, and source chains. Only manager
//! shutdown and structural misuse surface synchronously as hard failures;
//! every other category is contained at the smallest enclosing fan-out or
//! pipeline boundary and degrades the result instead of aborting the run.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the factweave core.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum WeaveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mediation(#[from] MediationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TaskError {
    #[error("task manager has been closed")]
    #[diagnostic(
        code(weave::task::manager_closed),
        help(
            "The task manager rejects submissions once its last owner has \
             released it. Keep a handle alive (clone it) for as long as work \
             needs to be scheduled."
        )
    )]
    ManagerClosed,

    #[error("task was cancelled before producing a result")]
    #[diagnostic(
        code(weave::task::cancelled),
        help(
            "Result handles are cancelled in bulk when the task manager shuts \
             down. Treat this as \"stop waiting\", not as a rollback of work \
             the task may already have done."
        )
    )]
    Cancelled,

    #[error("task body failed: {message}")]
    #[diagnostic(
        code(weave::task::failed),
        help(
            "The task body returned an error. It was routed to the task's \
             failure handlers and never re-thrown on the pool thread."
        )
    )]
    Failed { message: String },
}

/// Convenience alias for task operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

// ---------------------------------------------------------------------------
// Mediation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MediationError {
    #[error("data acquisition failed: {message}")]
    #[diagnostic(
        code(weave::mediation::acquire),
        help(
            "An acquirer could not fetch its raw data. The failure is \
             recovered locally inside the fan-out; sibling acquirers are \
             unaffected."
        )
    )]
    Acquire { message: String },

    #[error("data transformation failed: {message}")]
    #[diagnostic(
        code(weave::mediation::transform),
        help(
            "A transformer could not convert raw data into facts. Check that \
             the acquirer's payload matches what its transformer expects."
        )
    )]
    Transform { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Task(#[from] TaskError),
}

/// Convenience alias for mediation operations.
pub type MediationResult<T> = std::result::Result<T, MediationError>;

// ---------------------------------------------------------------------------
// Integration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IntegrationError {
    #[error("integrator manager has been closed")]
    #[diagnostic(
        code(weave::integration::closed),
        help(
            "Routing was requested after shutdown. Shutdown takes the rule \
             table's exclusive lock, so no routing call can race past it."
        )
    )]
    Closed,

    #[error("update step failed: {message}")]
    #[diagnostic(
        code(weave::integration::update),
        help(
            "The primary updater could not persist the incoming facts. Steps \
             that already ran are not rolled back."
        )
    )]
    Update { message: String },

    #[error("link step failed: {message}")]
    #[diagnostic(
        code(weave::integration::link),
        help(
            "A linker could not derive facts over its partition. Linker \
             failures are logged and dropped by the integrator; this error \
             only surfaces from the linker itself."
        )
    )]
    Link { message: String },

    #[error("clean step failed: {message}")]
    #[diagnostic(
        code(weave::integration::clean),
        help(
            "The cleanser failed over the target partition. Update and link \
             results remain in place."
        )
    )]
    Clean { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Task(#[from] TaskError),
}

/// Convenience alias for integration operations.
pub type IntegrationResult<T> = std::result::Result<T, IntegrationError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("partition \"{name}\" not found")]
    #[diagnostic(
        code(weave::store::partition_not_found),
        help("Create the partition first with `open_partition`, or check the name.")
    )]
    PartitionNotFound { name: String },
}

/// Convenience alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Inference cache errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("no partition named \"{name}\" exists in the store")]
    #[diagnostic(
        code(weave::cache::partition_not_found),
        help(
            "The inference cache derives views only over existing partitions. \
             Create and populate the partition before asking for its inferred \
             view."
        )
    )]
    PartitionNotFound { name: String },
}

/// Convenience alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(weave::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },
}

/// Convenience alias for functions returning factweave results.
pub type WeaveResult<T> = std::result::Result<T, WeaveError>;
