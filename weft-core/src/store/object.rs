//! Observable Objects
//!
//! An observable object is the bundled reactive-proxy implementation: a
//! keyed store whose reads call `track` before returning and whose writes
//! call `trigger` after storing. The engine itself only depends on the
//! [`ReactiveAccess`] capability, so embedders with their own interception
//! mechanism can implement the trait over any wrapper type and call the
//! `Runtime` primitives directly.
//!
//! # Identity
//!
//! Objects are identity-based: each carries a unique [`SourceId`] that keys
//! its entry in the dependency store. Cloning a handle shares the same
//! object. When the last handle drops, the object's store entry is
//! released.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tracing::trace;

use super::value::Value;
use crate::error::ReactiveError;
use crate::reactive::{Runtime, SourceId};

/// The reactive-proxy capability: a keyed store that participates in
/// dependency tracking.
///
/// `read` must call `track` before returning and `write` must call
/// `trigger` after storing, both synchronously.
pub trait ReactiveAccess {
    /// Read a property, registering the active computation as a subscriber.
    fn read(&self, key: &str) -> Option<Value>;

    /// Write a property, notifying its subscribers.
    fn write(&self, key: &str, value: Value);
}

/// A keyed observable store with tracked reads and triggering writes.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let object = ObservableObject::new(&runtime);
/// object.write("greeting", "hello");
///
/// let reader = object.clone();
/// Effect::new(&runtime, move || {
///     println!("{:?}", reader.read("greeting"));
/// });
///
/// object.write("greeting", "world"); // the effect re-runs
/// ```
pub struct ObservableObject {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    id: SourceId,
    runtime: Runtime,
    values: RwLock<IndexMap<String, Value>>,
}

impl ObservableObject {
    /// Create an empty observable object bound to `runtime`.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: SourceId::new(),
                runtime: runtime.clone(),
                values: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Create an observable object from initial entries.
    ///
    /// Initial population does not trigger anything: nothing can be
    /// subscribed yet.
    pub fn with_entries<K, V, I>(runtime: &Runtime, entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new(runtime);
        {
            let mut values = object
                .inner
                .values
                .write()
                .expect("object values lock poisoned");
            for (key, value) in entries {
                values.insert(key.into(), value.into());
            }
        }
        object
    }

    /// The object's identity in the dependency store.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Read a property.
    ///
    /// The read is tracked before the lookup, so reading an absent key
    /// still subscribes the active computation — a later write creating the
    /// key will notify it.
    pub fn read(&self, key: &str) -> Option<Value> {
        self.inner.runtime.track(self.inner.id, key);
        self.inner
            .values
            .read()
            .expect("object values lock poisoned")
            .get(key)
            .cloned()
    }

    /// Read a property without registering a dependency.
    pub fn read_untracked(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .read()
            .expect("object values lock poisoned")
            .get(key)
            .cloned()
    }

    /// Write a property and notify its subscribers.
    pub fn write(&self, key: &str, value: impl Into<Value>) {
        self.inner
            .values
            .write()
            .expect("object values lock poisoned")
            .insert(key.to_string(), value.into());
        trace!(source = self.inner.id.raw(), key, "observable write");
        self.inner.runtime.trigger(self.inner.id, key);
    }

    /// Read-modify-write an existing property.
    ///
    /// The read is tracked like any other, so an effect updating a property
    /// it also depends on relies on trigger's self-suppression rather than
    /// recursing.
    pub fn update<F>(&self, key: &str, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self
            .read(key)
            .ok_or_else(|| ReactiveError::UnknownKey(key.to_string()))?;
        self.write(key, f(&current));
        Ok(())
    }

    /// Snapshot of the property keys in insertion order.
    ///
    /// Key enumeration itself is not tracked; per-key reads are.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .values
            .read()
            .expect("object values lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Check whether a property exists, without tracking.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .values
            .read()
            .expect("object values lock poisoned")
            .contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.inner
            .values
            .read()
            .expect("object values lock poisoned")
            .len()
    }

    /// Check if the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReactiveAccess for ObservableObject {
    fn read(&self, key: &str) -> Option<Value> {
        ObservableObject::read(self, key)
    }

    fn write(&self, key: &str, value: Value) {
        ObservableObject::write(self, key, value)
    }
}

impl Clone for ObservableObject {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl PartialEq for ObservableObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ObservableObject {}

impl Debug for ObservableObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Nested objects may be cyclic; print identity and size only.
        f.debug_struct("ObservableObject")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.runtime.release_source(self.id);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
