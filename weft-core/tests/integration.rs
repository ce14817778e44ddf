//! Integration Tests for the Reactive Engine
//!
//! These tests exercise the engine end-to-end through the observable store:
//! tracking exactness, branch switching, self-suppression, nesting,
//! computed laziness, flush timing, and async invalidation.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use weft_core::reactive::{watch, Computed, Effect, FlushMode, Runtime, WatchOptions};
use weft_core::store::{ObservableObject, Value};

fn read_int(object: &ObservableObject, key: &str) -> i64 {
    object
        .read(key)
        .and_then(|value| value.as_int())
        .unwrap_or(0)
}

/// A write re-runs exactly the computations that read the written key.
#[test]
fn writes_rerun_only_readers_of_that_key() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("a", 1i64);
    object.write("b", 2i64);

    let a_runs = Arc::new(AtomicI32::new(0));
    let a_runs_clone = a_runs.clone();
    let a_reader = object.clone();
    let _a_effect = Effect::new(&runtime, move || {
        let _ = a_reader.read("a");
        a_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let b_runs = Arc::new(AtomicI32::new(0));
    let b_runs_clone = b_runs.clone();
    let b_reader = object.clone();
    let _b_effect = Effect::new(&runtime, move || {
        let _ = b_reader.read("b");
        b_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);

    // One write, one re-run, and only for the matching reader.
    object.write("a", 10i64);
    assert_eq!(a_runs.load(Ordering::SeqCst), 2);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);

    object.write("b", 20i64);
    assert_eq!(a_runs.load(Ordering::SeqCst), 2);
    assert_eq!(b_runs.load(Ordering::SeqCst), 2);
}

/// After a conditional's branch flips, subscriptions to the untaken branch
/// are gone.
#[test]
fn branch_switching_cleans_stale_subscriptions() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("ok", true);
    object.write("text", "hello");
    object.write("fallback", "none");

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = object.clone();
    let _effect = Effect::new(&runtime, move || {
        let key = match reader.read("ok") {
            Some(Value::Bool(true)) => "text",
            _ => "fallback",
        };
        let _ = reader.read(key);
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    object.write("ok", false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The stale branch no longer re-runs the effect...
    object.write("text", "changed");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // ...but the taken branch does.
    object.write("fallback", "other");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// A computation that increments a property it also reads runs exactly once
/// per external write instead of recursing forever.
#[test]
fn increment_in_place_does_not_self_trigger() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("count", 0i64);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let writer = object.clone();
    let _effect = Effect::new(&runtime, move || {
        writer
            .update("count", |value| {
                Value::Int(value.as_int().unwrap_or(0) + 1)
            })
            .unwrap();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Ran once at creation, incrementing 0 -> 1, without re-entering.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(read_int(&object, "count"), 1);

    // An external write triggers exactly one re-run: 10 -> 11.
    object.write("count", 10i64);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(read_int(&object, "count"), 11);
}

/// Nested computations attribute reads to the right level: the inner one to
/// itself, the outer one to itself once the inner finishes.
#[test]
fn nested_effects_keep_their_own_dependencies() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("x", 0i64);
    object.write("y", 0i64);

    let inner_runs = Arc::new(AtomicI32::new(0));
    let outer_runs = Arc::new(AtomicI32::new(0));

    let inner_runs_clone = inner_runs.clone();
    let outer_runs_clone = outer_runs.clone();
    let outer_reader = object.clone();
    let nested_runtime = runtime.clone();
    let _outer = Effect::new(&runtime, move || {
        let inner_runs = inner_runs_clone.clone();
        let inner_reader = outer_reader.clone();
        let _inner = Effect::new(&nested_runtime, move || {
            let _ = inner_reader.read("x");
            inner_runs.fetch_add(1, Ordering::SeqCst);
        });
        let _ = outer_reader.read("y");
        outer_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

    // x belongs to the inner computation only.
    object.write("x", 1i64);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

    // y belongs to the outer computation only; its re-run creates a fresh
    // inner computation (whose initial run counts once more).
    object.write("y", 1i64);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 3);
}

/// A computed neither evaluates eagerly on upstream writes nor re-evaluates
/// on back-to-back reads.
#[test]
fn computed_is_pull_based() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("a", 1i64);
    object.write("b", 2i64);

    let evaluations = Arc::new(AtomicI32::new(0));
    let evaluations_clone = evaluations.clone();
    let reader = object.clone();
    let sum = Computed::new(&runtime, move || {
        evaluations_clone.fetch_add(1, Ordering::SeqCst);
        read_int(&reader, "a") + read_int(&reader, "b")
    });

    assert_eq!(sum.get(), 3);
    assert_eq!(sum.get(), 3);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    // The write invalidates but does not evaluate.
    object.write("a", 40i64);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    assert_eq!(sum.get(), 42);
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

/// With post flush, the callback runs only after the synchronous execution
/// completes and the queue drains, with correct (new, old) pairs.
#[test]
fn post_flush_runs_after_the_triggering_write() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("n", 0i64);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = calls.clone();
    let getter_object = object.clone();
    let _watcher = watch(
        &runtime,
        move || read_int(&getter_object, "n"),
        move |new, old, _on_invalidate| {
            calls_clone.lock().unwrap().push((*new, old.copied()));
        },
        WatchOptions {
            flush: FlushMode::Post,
            ..WatchOptions::default()
        },
    );

    object.write("n", 1i64);
    assert!(
        calls.lock().unwrap().is_empty(),
        "post-flush callback must not run inside the triggering write"
    );
    runtime.flush_deferred().unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![(1, Some(0))]);

    object.write("n", 2i64);
    runtime.flush_deferred().unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![(1, Some(0)), (2, Some(1))]);
}

/// An invalidation handler registered by invocation N runs before
/// invocation N+1's callback body, letting N's async result be recognized
/// as stale when it arrives.
#[test]
fn superseded_callback_is_invalidated_before_the_next_one() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("query", 1i64);

    let log = Arc::new(Mutex::new(Vec::new()));
    // Stands in for an async operation still in flight when the next write
    // lands.
    let first_request_stale = Arc::new(AtomicBool::new(false));

    let log_clone = log.clone();
    let stale_flag = first_request_stale.clone();
    let getter_object = object.clone();
    let _watcher = watch(
        &runtime,
        move || read_int(&getter_object, "query"),
        move |new, _old, on_invalidate| {
            let invocation = *new;
            log_clone.lock().unwrap().push(format!("callback:{invocation}"));
            if invocation == 2 {
                let log = log_clone.clone();
                let stale = stale_flag.clone();
                on_invalidate.register(move || {
                    stale.store(true, Ordering::SeqCst);
                    log.lock().unwrap().push("invalidate:2".to_string());
                });
            }
        },
        WatchOptions::default(),
    );

    // Invocation 2 registers a handler for its in-flight work.
    object.write("query", 2i64);
    assert!(!first_request_stale.load(Ordering::SeqCst));

    // Invocation 3 supersedes it: the handler fires before the new body.
    object.write("query", 3i64);
    assert!(first_request_stale.load(Ordering::SeqCst));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "callback:2".to_string(),
            "invalidate:2".to_string(),
            "callback:3".to_string(),
        ]
    );

    // The "arriving" async result can now see it was superseded and discard
    // itself, exactly what the handler's side effect is for.
    assert!(first_request_stale.load(Ordering::SeqCst));
}

/// Computations subscribed during a trigger's dispatch are not notified by
/// that same trigger.
#[test]
fn subscribers_added_during_dispatch_wait_for_the_next_trigger() {
    let runtime = Runtime::new();
    let object = ObservableObject::new(&runtime);
    object.write("n", 0i64);

    let late_runs = Arc::new(AtomicI32::new(0));
    let late_effect: Arc<Mutex<Option<Effect<()>>>> = Arc::new(Mutex::new(None));

    let late_runs_clone = late_runs.clone();
    let late_effect_clone = late_effect.clone();
    let spawn_runtime = runtime.clone();
    let spawn_reader = object.clone();
    let outer_reader = object.clone();
    let spawned = Arc::new(AtomicBool::new(false));
    let spawned_clone = spawned.clone();
    let _outer = Effect::new(&runtime, move || {
        let _ = outer_reader.read("n");
        if spawned_clone.swap(true, Ordering::SeqCst) {
            // On the re-run (dispatched by the write below), subscribe a
            // brand-new computation to the same key.
            let late_runs = late_runs_clone.clone();
            let reader = spawn_reader.clone();
            let effect = Effect::new(&spawn_runtime, move || {
                let _ = reader.read("n");
                late_runs.fetch_add(1, Ordering::SeqCst);
            });
            *late_effect_clone.lock().unwrap() = Some(effect);
        }
    });

    // This write re-runs the outer effect, which subscribes the late
    // computation mid-dispatch. The late computation's only run so far is
    // its own initial one.
    object.write("n", 1i64);
    assert_eq!(late_runs.load(Ordering::SeqCst), 1);

    // The next write reaches it.
    object.write("n", 2i64);
    assert!(late_runs.load(Ordering::SeqCst) >= 2);
}
