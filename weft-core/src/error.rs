//! Error types for the reactive engine.
//!
//! The engine's fallible surface is deliberately small: user-supplied
//! computation bodies, getters, callbacks, and schedulers propagate their
//! panics to whatever synchronously caused them to run, and the engine
//! performs no recovery on their behalf. `ReactiveError` covers only the
//! operations the engine itself can refuse.

use thiserror::Error;

/// Errors produced by the reactive engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReactiveError {
    /// A read-modify-write was attempted on a property that does not exist.
    #[error("observable object has no property `{0}`")]
    UnknownKey(String),

    /// The deferred task queue was asked to drain while a drain was already
    /// in progress on the call stack.
    #[error("deferred task queue is already draining")]
    ReentrantFlush,
}
