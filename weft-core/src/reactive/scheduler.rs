//! Scheduling
//!
//! By default a triggered computation re-runs synchronously inside the
//! mutation that triggered it. A scheduler overrides that: the trigger path
//! hands the scheduler a runner for the computation and lets it decide when
//! (or whether) to execute it. Computed values use a scheduler to flip their
//! dirty flag instead of recomputing; watchers use one to implement flush
//! timing.
//!
//! Deferred execution goes through the [`TaskQueue`] capability. The engine
//! only assumes FIFO order within submission; the bundled [`DeferredQueue`]
//! is a plain queue the embedding host drains at a moment of its choosing,
//! and hosts with their own event loop can install a different
//! implementation via `Runtime::with_queue`.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use super::effect::EffectId;
use super::runtime::Runnable;
use crate::error::ReactiveError;

/// A deferred zero-argument task.
pub type Task = Box<dyn FnOnce() + Send>;

/// A caller-supplied override controlling when a notified computation
/// actually executes.
///
/// Invoked by the trigger path with a runner for the computation's run
/// procedure. A scheduler that never calls [`EffectRunner::run`] simply
/// drops the notification.
pub type SchedulerFn = Arc<dyn Fn(EffectRunner) + Send + Sync>;

/// Type-erased handle to a computation's run procedure, handed to
/// schedulers as the dispatch payload.
#[derive(Clone)]
pub struct EffectRunner {
    inner: Arc<dyn Runnable>,
}

impl EffectRunner {
    pub(crate) fn new(inner: Arc<dyn Runnable>) -> Self {
        Self { inner }
    }

    /// The ID of the computation behind this runner.
    pub fn id(&self) -> EffectId {
        self.inner.id()
    }

    /// Run the computation, discarding its result.
    pub fn run(&self) {
        self.inner.run_erased();
    }
}

impl Debug for EffectRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRunner")
            .field("id", &self.id())
            .finish()
    }
}

/// Deferred-execution capability: schedule a task to run after the current
/// synchronous execution completes.
///
/// Implementations must preserve FIFO order of tasks within the same
/// submission order.
pub trait TaskQueue: Send + Sync {
    /// Submit a task.
    fn defer(&self, task: Task);

    /// Run queued tasks until the queue is empty, returning how many ran.
    ///
    /// Tasks submitted while draining join the same drain. Implementations
    /// that hand tasks to an external event loop may return `Ok(0)`.
    fn drain(&self) -> Result<usize, ReactiveError>;
}

/// The bundled FIFO task queue.
///
/// Tasks accumulate until the host calls [`drain`](TaskQueue::drain) —
/// typically once the synchronous work that scheduled them has completed.
pub struct DeferredQueue {
    tasks: Mutex<VecDeque<Task>>,
    draining: AtomicBool,
}

/// Resets the draining flag even when a task panics mid-drain.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DeferredQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.tasks.lock().expect("task queue lock poisoned").len()
    }

    /// Check if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for DeferredQueue {
    fn defer(&self, task: Task) {
        self.tasks
            .lock()
            .expect("task queue lock poisoned")
            .push_back(task);
    }

    fn drain(&self) -> Result<usize, ReactiveError> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Err(ReactiveError::ReentrantFlush);
        }
        let _guard = DrainGuard(&self.draining);

        let mut ran = 0;
        // Pop one task at a time so tasks queued by a running task are
        // picked up by this same drain.
        loop {
            let task = self
                .tasks
                .lock()
                .expect("task queue lock poisoned")
                .pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }

        trace!(tasks = ran, "drained deferred queue");
        Ok(ran)
    }
}

impl Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.len())
            .finish()
    }
}
