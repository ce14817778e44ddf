//! Computed Values
//!
//! A Computed is a cached derived value built from a lazy effect plus a
//! dirty flag.
//!
//! # How Computed Values Work
//!
//! 1. The body never runs at creation; the cell starts dirty.
//!
//! 2. Reading `get()` while dirty runs the body, caches the result, and
//!    clears the flag; reading while clean returns the cache untouched.
//!
//! 3. When a dependency of the body changes, the internal effect's
//!    scheduler runs instead of the body: it marks the cell dirty and
//!    re-triggers the cell's own subscribers. The next `get()` recomputes.
//!
//! 4. Every `get()` also tracks the cell's synthetic key, so a computation
//!    reading the value subscribes to the cell like to any observable
//!    property.
//!
//! This is pull-based laziness: an upstream write costs one flag flip and
//! one notification, never an eager recomputation.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, SourceId};
use super::scheduler::{EffectRunner, SchedulerFn};

/// The synthetic property key under which a computed cell's subscribers are
/// recorded.
const VALUE_KEY: &str = "value";

/// A lazily-evaluated, cached derived value.
///
/// Cloning a `Computed` yields another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let object = ObservableObject::new(&runtime);
/// object.write("a", 1i64);
/// object.write("b", 2i64);
///
/// let reader = object.clone();
/// let sum = Computed::new(&runtime, move || {
///     let a = reader.read("a").and_then(|v| v.as_int()).unwrap_or(0);
///     let b = reader.read("b").and_then(|v| v.as_int()).unwrap_or(0);
///     a + b
/// });
///
/// assert_eq!(sum.get(), 3); // first read evaluates
/// assert_eq!(sum.get(), 3); // second read hits the cache
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    runtime: Runtime,
    effect: Effect<T>,
    value: RwLock<Option<T>>,
    shared: Arc<ComputedShared>,
}

/// State shared between the cell and its invalidation scheduler.
struct ComputedShared {
    cell: SourceId,
    runtime: Runtime,
    dirty: AtomicBool,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed cell over `body`. The body does not run until the
    /// first [`get`](Self::get).
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let shared = Arc::new(ComputedShared {
            cell: SourceId::new(),
            runtime: runtime.clone(),
            dirty: AtomicBool::new(true),
        });

        // Invalidate lazily: mark dirty and notify the cell's own
        // subscribers; never recompute here.
        let scheduler: SchedulerFn = {
            let shared = Arc::clone(&shared);
            Arc::new(move |_runner: EffectRunner| {
                if !shared.dirty.swap(true, Ordering::SeqCst) {
                    trace!(cell = shared.cell.raw(), "computed invalidated");
                    shared.runtime.trigger(shared.cell, VALUE_KEY);
                }
            })
        };

        let effect = Effect::with_options(
            runtime,
            body,
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
            },
        );

        Self {
            inner: Arc::new(ComputedInner {
                runtime: runtime.clone(),
                effect,
                value: RwLock::new(None),
                shared,
            }),
        }
    }

    /// Get the current value, recomputing it first if the cell is dirty.
    ///
    /// Reading also subscribes the currently active computation to the
    /// cell, so derived values compose with effects and other computed
    /// cells.
    pub fn get(&self) -> T {
        if self.inner.shared.dirty.load(Ordering::SeqCst) {
            let value = self.inner.effect.run();
            *self
                .inner
                .value
                .write()
                .expect("computed value lock poisoned") = Some(value);
            self.inner.shared.dirty.store(false, Ordering::SeqCst);
        }

        self.inner.runtime.track(self.inner.shared.cell, VALUE_KEY);

        self.inner
            .value
            .read()
            .expect("computed value lock poisoned")
            .clone()
            .expect("computed value present after refresh")
    }

    /// The cell's source identity in the dependency store.
    pub fn id(&self) -> SourceId {
        self.inner.shared.cell
    }

    /// Whether the next [`get`](Self::get) will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.shared.dirty.load(Ordering::SeqCst)
    }

    /// Check if the cell has ever been evaluated.
    pub fn has_value(&self) -> bool {
        self.inner
            .value
            .read()
            .expect("computed value lock poisoned")
            .is_some()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("cell", &self.inner.shared.cell)
            .field("dirty", &self.is_dirty())
            .field("has_value", &self.has_value())
            .finish()
    }
}

impl<T> Drop for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.effect.dispose();
        self.runtime.release_source(self.shared.cell);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
