//! Reactive Engine
//!
//! This module implements the core dependency-tracking engine: the runtime
//! with its track/trigger primitives, computations (effects), cached
//! derived values (computed), and watchers.
//!
//! # Concepts
//!
//! ## Track and trigger
//!
//! Reads on observable state call [`Runtime::track`], which subscribes the
//! currently active computation to the exact `(source, key)` cell that was
//! read. Writes call [`Runtime::trigger`], which re-runs (or schedules)
//! every subscriber of that cell.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation. Each run first removes every
//! subscription established by the previous run, so the dependency set
//! always reflects the reads the body actually performed. Effects may nest;
//! an explicit active-computation stack keeps attribution correct.
//!
//! ## Computed values
//!
//! A [`Computed`] caches its body's result and recomputes only on the first
//! read after an upstream change. Dependents of the computed value are
//! notified through the cell's own synthetic key.
//!
//! ## Watchers
//!
//! [`watch`] pairs a getter with a callback invoked on change with
//! `(new, old)` values, configurable flush timing, and an invalidation hook
//! for superseded asynchronous callbacks. [`watch_object`] watches every
//! property reachable from an observable object.

mod computed;
mod context;
mod effect;
mod runtime;
mod scheduler;
mod watch;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use effect::{Effect, EffectId, EffectOptions};
pub use runtime::{Runtime, SourceId};
pub use scheduler::{DeferredQueue, EffectRunner, SchedulerFn, Task, TaskQueue};
pub use watch::{watch, watch_object, FlushMode, OnInvalidate, WatchOptions, Watcher};
