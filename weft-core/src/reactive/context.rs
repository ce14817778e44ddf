//! Reactive Context
//!
//! While a computation executes, it must be the one new subscriptions are
//! attributed to — including when computations nest, where the inner
//! computation temporarily takes over and the outer one must be restored
//! afterwards. The runtime keeps an explicit stack for this; the guard in
//! this module keeps push and pop paired.

use std::sync::Arc;

use super::effect::EffectId;
use super::runtime::{Runnable, Runtime};

/// Guard that marks a computation as active for its lifetime.
///
/// Entering pushes the computation onto the runtime's active stack; dropping
/// the guard pops it. Because the pop lives in `Drop`, the stack is restored
/// even when the computation's body panics, so subsequent unrelated reads
/// are never mis-attributed.
pub struct ReactiveContext {
    runtime: Runtime,
    id: EffectId,
}

impl ReactiveContext {
    /// Enter a reactive context for the given computation.
    ///
    /// While the returned guard is live, reads on observable state register
    /// this computation as a subscriber.
    pub(crate) fn enter(runtime: &Runtime, computation: Arc<dyn Runnable>) -> Self {
        let id = computation.id();
        runtime.push_active(computation);
        Self {
            runtime: runtime.clone(),
            id,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        self.runtime.pop_active(self.id);
    }
}
