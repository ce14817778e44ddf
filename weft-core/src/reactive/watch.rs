//! Watchers
//!
//! A watcher pairs a dependency-producing getter with a user callback that
//! is invoked with `(new, old)` whenever the watched data changes. The
//! getter is wrapped in a lazy effect whose scheduler implements the flush
//! policy; the callback itself never participates in tracking.
//!
//! # Flush timing
//!
//! - [`FlushMode::Sync`]: the callback runs inside the call stack of the
//!   triggering mutation.
//! - [`FlushMode::Pre`]: dispatches like `Sync`. A named extension point for
//!   hosts that align watchers with an update cycle.
//! - [`FlushMode::Post`]: the callback is deferred through the runtime's
//!   task queue and runs when the host drains it.
//!
//! # Invalidation
//!
//! A callback that starts asynchronous work can register an invalidation
//! handler through the [`OnInvalidate`] argument. The handler runs at the
//! start of the *next* callback invocation — before its body — signalling
//! that the previous invocation's outstanding work is now stale and its
//! eventual result should be discarded. The engine does not cancel the
//! underlying work; it only delivers the signal.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::trace;

use super::effect::{Effect, EffectOptions, WeakEffect};
use super::runtime::Runtime;
use super::scheduler::{EffectRunner, SchedulerFn};
use crate::store::{traverse, ObservableObject, Value};

/// Policy controlling when a watcher's callback runs relative to the
/// triggering mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Run synchronously inside the triggering write.
    #[default]
    Sync,

    /// Dispatches like [`Sync`](FlushMode::Sync); reserved for host update
    /// cycles.
    Pre,

    /// Defer through the runtime's task queue.
    Post,
}

/// Options accepted by [`watch`] and [`watch_object`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Invoke the callback once immediately at creation.
    pub immediate: bool,

    /// Flush timing for subsequent invocations.
    pub flush: FlushMode,
}

type InvalidateHandler = Box<dyn FnOnce() + Send>;

/// Registration handle passed to watcher callbacks.
///
/// At most one handler is pending per watcher; registering again within the
/// same invocation replaces the previous registration.
pub struct OnInvalidate {
    slot: Arc<Mutex<Option<InvalidateHandler>>>,
}

impl OnInvalidate {
    /// Install a handler to run when this invocation is superseded.
    pub fn register<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .slot
            .lock()
            .expect("invalidation slot lock poisoned") = Some(Box::new(handler));
    }
}

type WatchCallback<T> = Box<dyn FnMut(&T, Option<&T>, &OnInvalidate) + Send>;

struct WatchState<T>
where
    T: Clone + Send + Sync + 'static,
{
    runtime: Runtime,
    flush: FlushMode,
    effect: OnceLock<WeakEffect<T>>,
    callback: Mutex<WatchCallback<T>>,
    old_value: Mutex<Option<T>>,
    invalidate: Arc<Mutex<Option<InvalidateHandler>>>,
}

/// Handle to an active watcher.
///
/// Dropping the handle without calling [`stop`](Self::stop) leaves the
/// watcher active: its computation stays alive through its subscriptions,
/// matching fire-and-forget registration.
pub struct Watcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    effect: Effect<T>,
    state: Arc<WatchState<T>>,
}

impl<T> Watcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Stop the watcher: drop all subscriptions and skip any still-queued
    /// deferred invocations.
    pub fn stop(&self) {
        self.effect.dispose();
    }

    /// Check if the watcher has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.effect.is_disposed()
    }

    /// The last value delivered to (or primed for) the callback.
    pub fn last_value(&self) -> Option<T> {
        self.state
            .old_value
            .lock()
            .expect("watch value lock poisoned")
            .clone()
    }
}

impl<T> Debug for Watcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("effect", &self.effect.id())
            .field("flush", &self.state.flush)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// One watcher invocation: re-read the source, fire the stale-work signal,
/// then the callback.
fn run_job<T>(state: &Arc<WatchState<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let Some(effect) = state.effect.get().and_then(WeakEffect::upgrade) else {
        return;
    };
    if effect.is_disposed() {
        return;
    }

    let new_value = effect.run();

    // A handler registered by the previous invocation means its async work
    // is now stale.
    if let Some(stale) = state
        .invalidate
        .lock()
        .expect("invalidation slot lock poisoned")
        .take()
    {
        trace!(effect = effect.id().raw(), "invalidating superseded watcher callback");
        stale();
    }

    let registrar = OnInvalidate {
        slot: Arc::clone(&state.invalidate),
    };
    let old_value = state
        .old_value
        .lock()
        .expect("watch value lock poisoned")
        .clone();

    {
        let mut callback = state.callback.lock().expect("watch callback lock poisoned");
        (*callback)(&new_value, old_value.as_ref(), &registrar);
    }

    *state
        .old_value
        .lock()
        .expect("watch value lock poisoned") = Some(new_value);
}

/// Watch a getter function.
///
/// The getter runs inside a lazy computation so that every observable
/// property it reads subscribes the watcher. When any of them changes, the
/// callback is invoked with the getter's new value, the previous value
/// (`None` before the first invocation), and an [`OnInvalidate`] registrar.
pub fn watch<T, F, C>(runtime: &Runtime, getter: F, callback: C, options: WatchOptions) -> Watcher<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
    C: FnMut(&T, Option<&T>, &OnInvalidate) + Send + 'static,
{
    let state = Arc::new(WatchState {
        runtime: runtime.clone(),
        flush: options.flush,
        effect: OnceLock::new(),
        callback: Mutex::new(Box::new(callback) as WatchCallback<T>),
        old_value: Mutex::new(None),
        invalidate: Arc::new(Mutex::new(None)),
    });

    let scheduler: SchedulerFn = {
        let state = Arc::clone(&state);
        Arc::new(move |_runner: EffectRunner| match state.flush {
            FlushMode::Post => {
                let job_state = Arc::clone(&state);
                state.runtime.defer(Box::new(move || run_job(&job_state)));
            }
            FlushMode::Sync | FlushMode::Pre => run_job(&state),
        })
    };

    let effect = Effect::with_options(
        runtime,
        getter,
        EffectOptions {
            lazy: true,
            scheduler: Some(scheduler),
        },
    );
    state
        .effect
        .set(effect.downgrade())
        .unwrap_or_else(|_| unreachable!("watch state initialized twice"));

    if options.immediate {
        run_job(&state);
    } else {
        // Prime the old value (and the dependency graph) without firing the
        // callback.
        let primed = effect.run();
        *state
            .old_value
            .lock()
            .expect("watch value lock poisoned") = Some(primed);
    }

    Watcher { effect, state }
}

/// Watch every property reachable from an observable object.
///
/// The derived getter deep-traverses the object purely for its tracking
/// side effects, so a write to any nested property fires the callback. The
/// watched value is the object itself.
pub fn watch_object<C>(
    runtime: &Runtime,
    source: &ObservableObject,
    callback: C,
    options: WatchOptions,
) -> Watcher<ObservableObject>
where
    C: FnMut(&ObservableObject, Option<&ObservableObject>, &OnInvalidate) + Send + 'static,
{
    let object = source.clone();
    watch(
        runtime,
        move || {
            traverse(&Value::Object(object.clone()));
            object.clone()
        },
        callback,
        options,
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
