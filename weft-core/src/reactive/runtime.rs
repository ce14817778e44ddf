//! Reactive Runtime
//!
//! The runtime is the central coordinator of the reactive system. It owns
//! the dependency store and the active-computation stack, and implements the
//! two primitives every reactive proxy calls into: `track` on property reads
//! and `trigger` on property writes.
//!
//! # How It Works
//!
//! 1. While a computation runs, it sits on top of the runtime's
//!    active-computation stack.
//!
//! 2. When an observable property is read, `track` subscribes the top of the
//!    stack to that `(source, key)` cell and records the cell on the
//!    computation for later cleanup.
//!
//! 3. When an observable property is written, `trigger` snapshots the cell's
//!    subscribers, excludes the computation that performed the write, and
//!    dispatches each subscriber either directly or through its scheduler.
//!
//! # Design
//!
//! The store and stack are fields of an explicit `Runtime` value rather than
//! process-wide globals. Handles are cheap to clone and share one inner, so
//! independent runtimes never interfere with each other (and tests get a
//! fresh engine each).

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tracing::trace;

use super::effect::EffectId;
use super::scheduler::{DeferredQueue, EffectRunner, SchedulerFn, Task, TaskQueue};
use crate::error::ReactiveError;

/// Unique identifier for an observable source.
///
/// Sources are identity-based: two observable objects are never the same
/// source, regardless of their contents. Derived cells (computed values)
/// mint their own `SourceId` so they can be subscribed to like any other
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation as seen by the dispatch path.
///
/// Concrete computations are generic over their body's return type; the
/// store and the trigger path only need identity, disposal state, an erased
/// run procedure, and the optional scheduler.
pub(crate) trait Runnable: Send + Sync {
    /// The computation's unique ID.
    fn id(&self) -> EffectId;

    /// Run the computation, discarding its result.
    fn run_erased(&self);

    /// The computation's configured scheduler, if any.
    fn scheduler(&self) -> Option<SchedulerFn>;

    /// Whether the computation has been disposed.
    fn is_disposed(&self) -> bool;

    /// Record a dependency cell on the computation for later cleanup.
    fn record_dependency(&self, cell: &Arc<DepCell>);
}

/// One cell of the dependency store: the set of computations subscribed to
/// a single `(source, key)` pair.
///
/// Subscribers are held strongly, so a computation stays alive for as long
/// as any cell references it. Computations hold their cells weakly, which
/// keeps the two-way bookkeeping cycle-free.
pub(crate) struct DepCell {
    source: SourceId,
    key: String,
    subscribers: RwLock<IndexMap<EffectId, Arc<dyn Runnable>>>,
}

impl DepCell {
    fn new(source: SourceId, key: &str) -> Self {
        Self {
            source,
            key: key.to_string(),
            subscribers: RwLock::new(IndexMap::new()),
        }
    }

    /// The source this cell belongs to.
    pub(crate) fn source(&self) -> SourceId {
        self.source
    }

    /// The property key this cell belongs to.
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Remove a subscriber. Removing an absent subscriber is a no-op, so
    /// duplicate entries in a computation's dependency list are harmless.
    pub(crate) fn remove_subscriber(&self, id: EffectId) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .shift_remove(&id);
    }
}

/// The reactive runtime: dependency store, active-computation stack, and
/// deferred task queue.
///
/// Cloning a `Runtime` yields another handle to the same engine.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    /// Dependency store: source identity -> property key -> subscriber cell.
    /// Entries are created lazily on first track.
    store: RwLock<HashMap<SourceId, IndexMap<String, Arc<DepCell>>>>,

    /// Currently-executing computations, innermost last. The top of the
    /// stack is the computation new subscriptions are attributed to.
    stack: RwLock<Vec<Arc<dyn Runnable>>>,

    /// Deferred-execution primitive used by post-flush watchers.
    queue: Arc<dyn TaskQueue>,
}

impl Runtime {
    /// Create a runtime with the bundled FIFO deferred queue.
    pub fn new() -> Self {
        Self::with_queue(Arc::new(DeferredQueue::new()))
    }

    /// Create a runtime that defers tasks through a host-provided queue.
    pub fn with_queue(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                store: RwLock::new(HashMap::new()),
                stack: RwLock::new(Vec::new()),
                queue,
            }),
        }
    }

    /// Record that the currently active computation depends on
    /// `(source, key)`.
    ///
    /// Reads performed outside any computation register no dependency.
    pub fn track(&self, source: SourceId, key: &str) {
        let Some(active) = self.active() else {
            return;
        };

        let cell = {
            let mut store = self
                .inner
                .store
                .write()
                .expect("dependency store lock poisoned");
            let keys = store.entry(source).or_default();
            Arc::clone(
                keys.entry(key.to_string())
                    .or_insert_with(|| Arc::new(DepCell::new(source, key))),
            )
        };

        cell.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .insert(active.id(), Arc::clone(&active));

        // The computation keeps its own list of cells so cleanup can undo
        // every subscription before the next run. Duplicate appends within
        // one run are acceptable; cleanup removes all occurrences.
        active.record_dependency(&cell);

        trace!(
            source = source.raw(),
            key,
            effect = active.id().raw(),
            "tracked dependency"
        );
    }

    /// Notify every computation subscribed to `(source, key)` that it
    /// changed.
    ///
    /// The subscriber set is snapshotted before dispatch: running a
    /// computation rewrites the store (cleanup then re-track), so the live
    /// set must never be iterated. The computation currently on top of the
    /// active stack — the one performing this mutation — is excluded, which
    /// keeps read-modify-write bodies from re-triggering themselves forever.
    pub fn trigger(&self, source: SourceId, key: &str) {
        let cell = {
            let store = self
                .inner
                .store
                .read()
                .expect("dependency store lock poisoned");
            store.get(&source).and_then(|keys| keys.get(key)).cloned()
        };
        let Some(cell) = cell else {
            return;
        };

        let active = self.active_id();
        let snapshot: Vec<Arc<dyn Runnable>> = cell
            .subscribers
            .read()
            .expect("subscriber lock poisoned")
            .values()
            .filter(|subscriber| Some(subscriber.id()) != active)
            .cloned()
            .collect();

        trace!(
            source = source.raw(),
            key,
            subscribers = snapshot.len(),
            "dispatching trigger"
        );

        // All engine locks are released before any user code runs.
        for subscriber in snapshot {
            if subscriber.is_disposed() {
                continue;
            }
            match subscriber.scheduler() {
                Some(scheduler) => scheduler(EffectRunner::new(Arc::clone(&subscriber))),
                None => subscriber.run_erased(),
            }
        }
    }

    /// Submit a task to the runtime's deferred-execution queue.
    pub fn defer(&self, task: Task) {
        self.inner.queue.defer(task);
    }

    /// Drain the deferred-execution queue, returning how many tasks ran.
    pub fn flush_deferred(&self) -> Result<usize, ReactiveError> {
        self.inner.queue.drain()
    }

    /// Check whether a computation is currently being tracked.
    pub fn is_tracking(&self) -> bool {
        !self
            .inner
            .stack
            .read()
            .expect("active stack lock poisoned")
            .is_empty()
    }

    /// Drop the store entry for a source that is no longer reachable.
    pub(crate) fn release_source(&self, source: SourceId) {
        self.inner
            .store
            .write()
            .expect("dependency store lock poisoned")
            .remove(&source);
    }

    pub(crate) fn push_active(&self, computation: Arc<dyn Runnable>) {
        self.inner
            .stack
            .write()
            .expect("active stack lock poisoned")
            .push(computation);
    }

    pub(crate) fn pop_active(&self, expected: EffectId) {
        let popped = self
            .inner
            .stack
            .write()
            .expect("active stack lock poisoned")
            .pop();

        // Catch mismatched push/pop pairs early in debug builds.
        if let Some(computation) = popped {
            debug_assert_eq!(
                computation.id(),
                expected,
                "active stack mismatch: expected {:?}, got {:?}",
                expected,
                computation.id()
            );
        }
    }

    pub(crate) fn active(&self) -> Option<Arc<dyn Runnable>> {
        self.inner
            .stack
            .read()
            .expect("active stack lock poisoned")
            .last()
            .cloned()
    }

    pub(crate) fn active_id(&self) -> Option<EffectId> {
        self.active().map(|computation| computation.id())
    }

    /// Number of computations currently subscribed to `(source, key)`.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, source: SourceId, key: &str) -> usize {
        let store = self
            .inner
            .store
            .read()
            .expect("dependency store lock poisoned");
        store
            .get(&source)
            .and_then(|keys| keys.get(key))
            .map(|cell| {
                cell.subscribers
                    .read()
                    .expect("subscriber lock poisoned")
                    .len()
            })
            .unwrap_or(0)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources = self
            .inner
            .store
            .read()
            .expect("dependency store lock poisoned")
            .len();
        let depth = self
            .inner
            .stack
            .read()
            .expect("active stack lock poisoned")
            .len();
        f.debug_struct("Runtime")
            .field("sources", &sources)
            .field("stack_depth", &depth)
            .finish()
    }
}
