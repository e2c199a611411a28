//! Bounded task execution with lifecycle, handlers, and shared shutdown.
//!
//! One fixed-size worker pool backs every concurrent operation in the core:
//! acquisition fan-out, link fan-out, and partition dispatch all borrow slots
//! from the same [`TaskManager`]. A task moves through
//! submitted → running → {closed, failed}; close-handlers and
//! failure-handlers fire exactly once on the matching terminal transition.
//!
//! The manager itself is a cheap handle around a shared core with an explicit
//! atomic reference count: cloning a handle takes a reference, [`TaskManager::close`]
//! releases one, and the real shutdown runs only when the last owner releases
//! (or when a forced shutdown is requested). Submission takes the shared side
//! of the phase lock and shutdown the exclusive side, so a racing submission
//! is either fully admitted or rejected — never half-tracked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, mpsc};
use std::thread;

use crate::error::{TaskError, TaskResult};

/// Identifier of a submitted task, unique per manager.
pub type TaskId = u64;

/// Handler invoked exactly once when a task closes normally.
pub type CloseHandler = Box<dyn FnOnce() + Send>;
/// Handler invoked exactly once, with the error, when a task fails.
pub type FailureHandler = Box<dyn FnOnce(&TaskError) + Send>;

type Job = Box<dyn FnOnce() + Send>;

// ---------------------------------------------------------------------------
// Task trait
// ---------------------------------------------------------------------------

/// A unit of concurrent work.
///
/// The body returns a `Result`; errors are caught by the pool and routed to
/// the task's failure handlers, never propagated to the worker thread.
pub trait Task: Send {
    /// Execute the task body.
    fn execute(&mut self) -> TaskResult<()>;

    /// Release resources owned by the task. Called after the terminal
    /// transition, regardless of outcome.
    fn close(&mut self) {}
}

/// Adapts a closure into a [`Task`].
pub struct FnTask<F>(Option<F>);

impl<F> FnTask<F>
where
    F: FnOnce() -> TaskResult<()> + Send,
{
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F> Task for FnTask<F>
where
    F: FnOnce() -> TaskResult<()> + Send,
{
    fn execute(&mut self) -> TaskResult<()> {
        match self.0.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope: task + handlers
// ---------------------------------------------------------------------------

/// A task bundled with its close- and failure-handlers, ready for submission.
pub struct TaskEnvelope {
    task: Box<dyn Task>,
    on_close: Vec<CloseHandler>,
    on_failure: Vec<FailureHandler>,
}

impl TaskEnvelope {
    /// Wrap a task for submission.
    pub fn new(task: impl Task + 'static) -> Self {
        Self {
            task: Box::new(task),
            on_close: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    /// Wrap a closure for submission.
    pub fn from_fn(f: impl FnOnce() -> TaskResult<()> + Send + 'static) -> Self {
        Self::new(FnTask::new(f))
    }

    /// Attach a close handler, fired exactly once if the task closes.
    pub fn on_close(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_close.push(Box::new(f));
        self
    }

    /// Attach a failure handler, fired exactly once if the task fails.
    pub fn on_failure(mut self, f: impl FnOnce(&TaskError) + Send + 'static) -> Self {
        self.on_failure.push(Box::new(f));
        self
    }
}

// ---------------------------------------------------------------------------
// Task lifecycle state
// ---------------------------------------------------------------------------

const SUBMITTED: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;
const FAILED: u8 = 3;

struct Handlers {
    on_close: Vec<CloseHandler>,
    on_failure: Vec<FailureHandler>,
}

/// Shared lifecycle record of one tracked task.
struct TaskState {
    phase: AtomicU8,
    handlers: Mutex<Option<Handlers>>,
}

impl TaskState {
    fn new(on_close: Vec<CloseHandler>, on_failure: Vec<FailureHandler>) -> Self {
        Self {
            phase: AtomicU8::new(SUBMITTED),
            handlers: Mutex::new(Some(Handlers {
                on_close,
                on_failure,
            })),
        }
    }

    /// SUBMITTED → RUNNING. Fails if a terminal state was already claimed
    /// (force-closed while still queued).
    fn mark_running(&self) -> bool {
        self.phase
            .compare_exchange(SUBMITTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn claim_terminal(&self, terminal: u8) -> bool {
        self.phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |phase| {
                (phase == SUBMITTED || phase == RUNNING).then_some(terminal)
            })
            .is_ok()
    }

    /// Transition to CLOSED, firing close handlers. True if this call won the
    /// terminal transition.
    fn close(&self) -> bool {
        if !self.claim_terminal(CLOSED) {
            return false;
        }
        if let Some(handlers) = self.handlers.lock().expect("handler lock poisoned").take() {
            for handler in handlers.on_close {
                handler();
            }
        }
        true
    }

    /// Transition to FAILED, firing failure handlers with the error.
    fn fail(&self, error: &TaskError) -> bool {
        if !self.claim_terminal(FAILED) {
            return false;
        }
        if let Some(handlers) = self.handlers.lock().expect("handler lock poisoned").take() {
            for handler in handlers.on_failure {
                handler(error);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Result handles
// ---------------------------------------------------------------------------

/// Handle for a typed result submitted via [`TaskManager::submit_with_result`].
///
/// Cancelled in bulk when the manager shuts down; a cancelled handle's
/// [`join`](TaskHandle::join) returns [`TaskError::Cancelled`].
pub struct TaskHandle<T> {
    id: TaskId,
    rx: mpsc::Receiver<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Identifier of the underlying task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the manager cancelled this handle.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Block until the result is available or the handle is cancelled.
    pub fn join(self) -> TaskResult<T> {
        self.rx.recv().map_err(|_| TaskError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Closing,
    Closed,
}

struct PoolState {
    phase: Phase,
    sender: Option<mpsc::Sender<Job>>,
}

struct ManagerCore {
    state: RwLock<PoolState>,
    tracked: Mutex<HashMap<TaskId, Arc<TaskState>>>,
    result_flags: Mutex<HashMap<TaskId, Arc<AtomicBool>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    next_id: AtomicU64,
    refs: AtomicUsize,
    capacity: usize,
}

/// Shared handle on the bounded worker pool.
///
/// Clone freely: each clone takes a reference; the pool shuts down when the
/// last reference is released via [`close`](TaskManager::close) (or drop).
pub struct TaskManager {
    core: Arc<ManagerCore>,
    released: AtomicBool,
}

impl TaskManager {
    /// Create a manager with a fixed pool of `workers` threads (at least 1).
    pub fn new(workers: usize) -> Self {
        let capacity = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(capacity);
        for n in 0..capacity {
            let rx = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("weave-worker-{n}"))
                .spawn(move || worker_loop(rx))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        tracing::debug!(workers = capacity, "task manager pool started");
        Self {
            core: Arc::new(ManagerCore {
                state: RwLock::new(PoolState {
                    phase: Phase::Open,
                    sender: Some(sender),
                }),
                tracked: Mutex::new(HashMap::new()),
                result_flags: Mutex::new(HashMap::new()),
                workers: Mutex::new(handles),
                next_id: AtomicU64::new(1),
                refs: AtomicUsize::new(1),
                capacity,
            }),
            released: AtomicBool::new(false),
        }
    }

    /// Number of worker threads in the pool.
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }

    /// Whether the manager has begun (or finished) shutting down.
    pub fn is_closed(&self) -> bool {
        self.core.state.read().expect("manager state lock poisoned").phase != Phase::Open
    }

    /// Submit a fire-and-forget task.
    ///
    /// The task is tracked until its terminal transition; body errors are
    /// routed to its failure handlers. Rejected with [`TaskError::ManagerClosed`]
    /// once shutdown has begun.
    pub fn submit(&self, envelope: TaskEnvelope) -> TaskResult<TaskId> {
        let state = self.core.state.read().expect("manager state lock poisoned");
        if state.phase != Phase::Open {
            return Err(TaskError::ManagerClosed);
        }
        let sender = state.sender.as_ref().ok_or(TaskError::ManagerClosed)?;

        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        let task_state = Arc::new(TaskState::new(envelope.on_close, envelope.on_failure));
        self.core
            .tracked
            .lock()
            .expect("task registry lock poisoned")
            .insert(id, Arc::clone(&task_state));

        let core = Arc::clone(&self.core);
        let mut task = envelope.task;
        let job: Job = Box::new(move || {
            if !task_state.mark_running() {
                // Force-closed while still queued; the body never runs.
                return;
            }
            match task.execute() {
                Ok(()) => {
                    task_state.close();
                }
                Err(error) => {
                    tracing::debug!(task = id, error = %error, "task body failed");
                    task_state.fail(&error);
                }
            }
            task.close();
            core.tracked
                .lock()
                .expect("task registry lock poisoned")
                .remove(&id);
        });

        sender.send(job).map_err(|_| TaskError::ManagerClosed)?;
        tracing::trace!(task = id, "task submitted");
        Ok(id)
    }

    /// Submit a callable whose value is retrieved through a [`TaskHandle`].
    ///
    /// Handles are registered for mass cancellation: shutdown flags every
    /// outstanding handle and pending bodies are skipped.
    pub fn submit_with_result<T, F>(&self, f: F) -> TaskResult<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let state = self.core.state.read().expect("manager state lock poisoned");
        if state.phase != Phase::Open {
            return Err(TaskError::ManagerClosed);
        }
        let sender = state.sender.as_ref().ok_or(TaskError::ManagerClosed)?;

        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<T>();
        self.core
            .result_flags
            .lock()
            .expect("result registry lock poisoned")
            .insert(id, Arc::clone(&cancelled));

        let core = Arc::clone(&self.core);
        let flag = Arc::clone(&cancelled);
        let job: Job = Box::new(move || {
            if !flag.load(Ordering::Acquire) {
                // Dropping tx without sending wakes the joiner with Cancelled.
                let _ = tx.send(f());
            }
            core.result_flags
                .lock()
                .expect("result registry lock poisoned")
                .remove(&id);
        });

        sender.send(job).map_err(|_| TaskError::ManagerClosed)?;
        Ok(TaskHandle { id, rx, cancelled })
    }

    /// Release this owner's reference. The pool shuts down when the last
    /// reference is released; calling `close` twice on one handle is a no-op.
    ///
    /// Returns `true` if this call performed the actual shutdown.
    pub fn close(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if self.core.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            return shutdown_core(&self.core);
        }
        false
    }

    /// Shut the pool down immediately, regardless of outstanding references.
    pub fn force_shutdown(&self) -> bool {
        shutdown_core(&self.core)
    }
}

impl Clone for TaskManager {
    fn clone(&self) -> Self {
        self.core.refs.fetch_add(1, Ordering::SeqCst);
        Self {
            core: Arc::clone(&self.core),
            released: AtomicBool::new(false),
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("capacity", &self.core.capacity)
            .field("refs", &self.core.refs.load(Ordering::SeqCst))
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The one-shot shutdown sequence. Exactly one caller wins the
/// Open → Closing transition; everyone else returns immediately.
fn shutdown_core(core: &Arc<ManagerCore>) -> bool {
    let sender = {
        let mut state = core.state.write().expect("manager state lock poisoned");
        if state.phase != Phase::Open {
            return false;
        }
        state.phase = Phase::Closing;
        state.sender.take()
    };
    tracing::info!("task manager shutting down");

    // Cancel every outstanding result handle.
    for (_, flag) in core
        .result_flags
        .lock()
        .expect("result registry lock poisoned")
        .drain()
    {
        flag.store(true, Ordering::Release);
    }

    // Force-close every tracked task: queued bodies are skipped, in-flight
    // bodies complete but find the terminal state already claimed.
    for (_, task) in core
        .tracked
        .lock()
        .expect("task registry lock poisoned")
        .drain()
    {
        task.close();
    }

    // Disconnect the queue so workers drain the backlog and exit.
    drop(sender);

    let workers: Vec<_> = {
        let mut guard = core.workers.lock().expect("worker registry lock poisoned");
        guard.drain(..).collect()
    };
    let current = thread::current().id();
    for worker in workers {
        if worker.thread().id() != current {
            let _ = worker.join();
        }
    }

    core.state.write().expect("manager state lock poisoned").phase = Phase::Closed;
    tracing::info!("task manager closed");
    true
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let queue = rx.lock().expect("worker queue lock poisoned");
            queue.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}
