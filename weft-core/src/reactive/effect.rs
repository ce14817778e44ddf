//! Effect Implementation
//!
//! An Effect is the engine's unit of computation: a wrapped body whose
//! dependencies are re-established each time it runs.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its body immediately to
//!    establish initial dependencies.
//!
//! 2. Every run starts with cleanup: the effect removes itself from every
//!    dependency cell it joined last time. Reads during the run then rebuild
//!    the set from scratch, so a body whose read-set changes between runs
//!    ("branch switching") never keeps stale subscriptions.
//!
//! 3. While the body runs, the effect sits on the runtime's active stack, so
//!    reads attribute to it — and so a write it performs itself does not
//!    re-trigger it.
//!
//! 4. When a dependency changes, the trigger path either re-runs the effect
//!    directly or hands its run procedure to the effect's scheduler.
//!
//! # Differences from Computed
//!
//! Computed values are built on top of lazy effects; a plain effect has no
//! cache, no dirty flag, and by default re-runs eagerly on every trigger.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{DepCell, Runnable, Runtime, SourceId};
use super::scheduler::SchedulerFn;

/// Unique identifier for a computation.
///
/// Computations are identity-based; two computations are never equal by
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Options controlling how a computation is created and re-dispatched.
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run the body at creation; the caller runs it manually.
    pub lazy: bool,

    /// On trigger, hand the run procedure to this scheduler instead of
    /// re-running synchronously.
    pub scheduler: Option<SchedulerFn>,
}

/// A re-runnable computation whose dependencies are re-established on every
/// run.
///
/// Cloning an `Effect` yields another handle to the same computation.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let object = ObservableObject::new(&runtime);
/// object.write("count", 0i64);
///
/// let reader = object.clone();
/// let effect = Effect::new(&runtime, move || {
///     println!("count is {:?}", reader.read("count"));
/// });
///
/// object.write("count", 5i64); // effect re-runs
/// ```
pub struct Effect<T> {
    inner: Arc<EffectInner<T>>,
}

pub(crate) struct EffectInner<T> {
    id: EffectId,
    runtime: Runtime,
    body: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<SchedulerFn>,

    /// Dependency cells this computation currently belongs to. Used only
    /// for cleanup; duplicates are permitted and removed wholesale.
    deps: RwLock<SmallVec<[Weak<DepCell>; 4]>>,

    disposed: AtomicBool,
    run_count: AtomicUsize,

    /// Back-reference for pushing ourselves onto the active stack.
    weak_self: Weak<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once immediately.
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(runtime, body, EffectOptions::default())
    }

    /// Create an effect with explicit options.
    ///
    /// The handle is returned regardless of `lazy`, so callers needing
    /// manual control always receive it.
    pub fn with_options<F>(runtime: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak_self| EffectInner {
            id: EffectId::new(),
            runtime: runtime.clone(),
            body: Box::new(body),
            scheduler: options.scheduler,
            deps: RwLock::new(SmallVec::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            weak_self: weak_self.clone(),
        });

        let effect = Self { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Run the computation and return its body's value.
    ///
    /// Cleans stale subscriptions, marks the computation active for the
    /// duration of the body, and restores the previous active computation
    /// afterwards — on panic as well as on normal return.
    pub fn run(&self) -> T {
        self.inner.run()
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Stop the computation: remove every subscription and skip it in all
    /// future trigger dispatch.
    ///
    /// A manual [`run`](Self::run) on a disposed effect still executes the
    /// body, but without tracking.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.cleanup();
            trace!(effect = self.inner.id.raw(), "effect disposed");
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of entries in the dependency list.
    ///
    /// Counts list entries, not distinct cells; reading the same property
    /// twice in one run yields two entries.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .read()
            .expect("dependency list lock poisoned")
            .len()
    }

    /// The `(source, key)` cells this computation is currently subscribed
    /// to.
    pub fn dependencies(&self) -> Vec<(SourceId, String)> {
        self.inner
            .deps
            .read()
            .expect("dependency list lock poisoned")
            .iter()
            .filter_map(|cell| {
                cell.upgrade()
                    .map(|cell| (cell.source(), cell.key().to_string()))
            })
            .collect()
    }

    pub(crate) fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> T {
        if self.disposed.load(Ordering::SeqCst) {
            // A disposed computation still runs on explicit request, but no
            // longer participates in tracking.
            let result = (self.body)();
            self.run_count.fetch_add(1, Ordering::SeqCst);
            return result;
        }

        self.cleanup();

        let me = self
            .weak_self
            .upgrade()
            .expect("effect inner deallocated during run");
        let _ctx = ReactiveContext::enter(&self.runtime, me as Arc<dyn Runnable>);

        let result = (self.body)();
        self.run_count.fetch_add(1, Ordering::SeqCst);
        trace!(effect = self.id.raw(), "effect ran");
        result
    }

    /// Remove this computation from every dependency cell it belongs to and
    /// empty the list, restoring the bidirectional-consistency invariant
    /// before the next run re-tracks.
    fn cleanup(&self) {
        let cells = {
            let mut deps = self.deps.write().expect("dependency list lock poisoned");
            std::mem::take(&mut *deps)
        };
        for cell in cells {
            if let Some(cell) = cell.upgrade() {
                cell.remove_subscriber(self.id);
            }
        }
    }
}

impl<T: 'static> Runnable for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn run_erased(&self) {
        self.run();
    }

    fn scheduler(&self) -> Option<SchedulerFn> {
        self.scheduler.clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn record_dependency(&self, cell: &Arc<DepCell>) {
        self.deps
            .write()
            .expect("dependency list lock poisoned")
            .push(Arc::downgrade(cell));
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for Effect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Weak handle to a computation, used where a strong handle would form a
/// reference cycle through a scheduler closure.
pub(crate) struct WeakEffect<T> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub(crate) fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
