//! Deep Traversal
//!
//! Recursively reads every property reachable from a value so that the
//! currently active computation subscribes to all of it. The traversal's
//! return value is meaningless to callers; the reads are the point.
//!
//! A seen-set of object identities guards against reference cycles.
//! Indexed collections are not part of the value model, so only object
//! properties are visited.

use std::collections::HashSet;

use super::value::Value;
use crate::reactive::SourceId;

/// Read every property reachable from `value` through the tracking read
/// path.
///
/// Outside a computation this is a no-op beyond the reads themselves, since
/// untracked reads register nothing.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_value(value, &mut seen);
}

fn traverse_value(value: &Value, seen: &mut HashSet<SourceId>) {
    let Value::Object(object) = value else {
        return;
    };
    // A previously-visited object means a reference cycle; stop there.
    if !seen.insert(object.id()) {
        return;
    }
    for key in object.keys() {
        if let Some(child) = object.read(&key) {
            traverse_value(&child, seen);
        }
    }
}
