//! Weft Core
//!
//! This crate provides the core dependency-tracking engine for the Weft
//! reactive state framework. It implements:
//!
//! - The dependency store and track/trigger primitives
//! - Re-runnable computations (effects) with automatic dependency cleanup
//! - Lazily cached derived values (computed)
//! - Watchers with flush-timing control and async invalidation
//! - An observable keyed store with tracked reads and triggering writes
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the engine — runtime, effects, computed values, watchers,
//!   and scheduling
//! - `store`: observable state — the bundled reactive-proxy implementation
//!   and the deep traversal helper
//!
//! All engine state lives in an explicit [`reactive::Runtime`] value, so
//! independent engines never interfere and each test gets a fresh one.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{Computed, Effect, Runtime};
//! use weft_core::store::ObservableObject;
//!
//! let runtime = Runtime::new();
//! let state = ObservableObject::new(&runtime);
//! state.write("a", 1i64);
//! state.write("b", 2i64);
//!
//! // A derived value, recomputed lazily.
//! let reader = state.clone();
//! let sum = Computed::new(&runtime, move || {
//!     let a = reader.read("a").and_then(|v| v.as_int()).unwrap_or(0);
//!     let b = reader.read("b").and_then(|v| v.as_int()).unwrap_or(0);
//!     a + b
//! });
//!
//! // An effect that re-runs whenever the sum changes.
//! let sum_reader = sum.clone();
//! Effect::new(&runtime, move || {
//!     println!("sum = {}", sum_reader.get());
//! });
//!
//! state.write("a", 40i64);
//! // Effect automatically re-runs, prints: "sum = 42"
//! ```

pub mod error;
pub mod reactive;
pub mod store;
