//! Integration Tests for the Reactivity Core
//!
//! These tests verify the observable properties of the system end to
//! end: identity stability, flavor precedence, track/trigger precision,
//! dependency pruning, readonly enforcement, shallow boundaries, and
//! collection semantics.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use weft_core::{untracked, Effect, EffectOptions, Observed, Runtime, Value};

fn wrap(rt: &Runtime, value: Value) -> Observed {
    rt.reactive(value).into_observed().expect("eligible value")
}

/// Identity stability: repeated wrapping yields the same wrapper.
#[test]
fn identity_stability() {
    let rt = Runtime::new();
    let raw = Value::object();

    assert_eq!(rt.reactive(raw.clone()), rt.reactive(raw.clone()));
    assert_eq!(rt.readonly(raw.clone()), rt.readonly(raw));
}

/// Flavor precedence: readonly-of-reactive wraps the same raw as
/// readonly-of-raw, and reactive-of-readonly is the readonly wrapper.
#[test]
fn flavor_precedence() {
    let rt = Runtime::new();
    let raw = Value::object();

    let reactive = rt.reactive(raw.clone());
    let ro_of_reactive = rt.readonly(reactive.clone());
    let ro_of_raw = rt.readonly(raw.clone());
    assert_eq!(ro_of_reactive, ro_of_raw);
    assert_eq!(ro_of_reactive.to_raw(), raw);

    let reactive_of_ro = rt.reactive(ro_of_raw.clone());
    assert_eq!(reactive_of_ro, ro_of_raw);
}

/// The end-to-end scenario: a write re-runs a dependent effect exactly
/// once, and the effect has run exactly twice in total.
#[test]
fn write_reruns_dependent_effect_exactly_once() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("count", Value::from(0))]));

    let seen = Arc::new(AtomicI32::new(-1));
    let seen_clone = seen.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        let count = reader.get("count").as_i64().unwrap_or(0);
        seen_clone.store((count * 2) as i32, Ordering::SeqCst);
    });

    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(effect.run_count(), 1);

    state.set("count", Value::from(5));

    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert_eq!(effect.run_count(), 2);

    // Same value again: no third run.
    state.set("count", Value::from(5));
    assert_eq!(effect.run_count(), 2);
}

/// Dependency pruning: after a run that took the other branch, writes
/// to the no-longer-read property must not re-run the effect.
#[test]
fn conditional_reads_prune_stale_dependencies() {
    let rt = Runtime::new();
    let state = wrap(
        &rt,
        Value::object_from([
            ("use_a", Value::from(true)),
            ("a", Value::from(1)),
            ("b", Value::from(10)),
        ]),
    );

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        let branch = if reader.get("use_a").as_bool().unwrap_or(false) {
            reader.get("a")
        } else {
            reader.get("b")
        };
        observed_clone.store(branch.as_i64().unwrap_or(0) as i32, Ordering::SeqCst);
    });
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    // Flip the branch; the effect now reads `b`.
    state.set("use_a", Value::from(false));
    assert_eq!(observed.load(Ordering::SeqCst), 10);
    let runs_after_flip = effect.run_count();

    // `a` is stale: writing it must not re-run the effect.
    state.set("a", Value::from(2));
    assert_eq!(effect.run_count(), runs_after_flip);

    // `b` is live: writing it must.
    state.set("b", Value::from(20));
    assert_eq!(observed.load(Ordering::SeqCst), 20);
    assert_eq!(effect.run_count(), runs_after_flip + 1);
}

/// Readonly enforcement: mutation attempts neither stick nor panic.
#[test]
fn readonly_rejects_mutation_without_panicking() {
    let rt = Runtime::new();
    let raw = Value::object_from([("x", Value::from(1))]);
    let ro = rt.readonly(raw.clone()).into_observed().expect("wrapped");

    assert!(!ro.set("x", Value::from(99)));
    assert_eq!(ro.to_raw().get("x"), Value::from(1));
    assert_eq!(raw.get("x"), Value::from(1));
}

/// Readonly writes leave the dependency graph untouched: an effect
/// reading through the mutable wrapper is not notified.
#[test]
fn readonly_writes_do_not_touch_the_graph() {
    let rt = Runtime::new();
    let raw = Value::object_from([("x", Value::from(1))]);
    let state = wrap(&rt, raw.clone());
    let ro = rt.readonly(raw).into_observed().expect("wrapped");

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let _effect = Effect::new(move || {
        reader.get("x");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    ro.set("x", Value::from(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Shallow boundary: nested reads come back raw from shallow wrappers
/// and wrapped from deep ones.
#[test]
fn shallow_boundary() {
    let rt = Runtime::new();
    let make = || Value::object_from([("inner", Value::object())]);

    let shallow = rt
        .shallow_reactive(make())
        .into_observed()
        .expect("wrapped");
    assert!(!shallow.get("inner").is_reactive());

    let deep = wrap(&rt, make());
    assert!(deep.get("inner").is_reactive());
}

/// Collection add/iterate: a size reader re-runs on a new key, not on a
/// redundant write to an existing key.
#[test]
fn map_size_readers_rerun_on_add_only() {
    let rt = Runtime::new();
    let map = wrap(&rt, Value::map());
    map.set("existing", Value::from(1));

    let sizes = Arc::new(AtomicI32::new(0));
    let runs = Arc::new(AtomicI32::new(0));
    let sizes_clone = sizes.clone();
    let runs_clone = runs.clone();
    let reader = map.clone();
    let _effect = Effect::new(move || {
        sizes_clone.store(reader.len() as i32, Ordering::SeqCst);
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!((sizes.load(Ordering::SeqCst), runs.load(Ordering::SeqCst)), (1, 1));

    map.set("new-key", Value::from(2));
    assert_eq!((sizes.load(Ordering::SeqCst), runs.load(Ordering::SeqCst)), (2, 2));

    map.set("existing", Value::from(1));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Nested effects: the inner effect's reads are not attributed to the
/// outer one.
#[test]
fn nested_effects_track_independently() {
    let rt = Runtime::new();
    let state = wrap(
        &rt,
        Value::object_from([("outer", Value::from(1)), ("inner", Value::from(2))]),
    );

    let outer_runs = Arc::new(AtomicI32::new(0));
    let inner_effect: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));

    let outer_runs_clone = outer_runs.clone();
    let inner_slot = inner_effect.clone();
    let reader = state.clone();
    let _outer = Effect::new(move || {
        outer_runs_clone.fetch_add(1, Ordering::SeqCst);
        reader.get("outer");

        // First run only: spin up an inner effect that reads `inner`.
        let mut slot = inner_slot.lock().expect("slot lock");
        if slot.is_none() {
            let inner_reader = reader.clone();
            *slot = Some(Effect::new(move || {
                inner_reader.get("inner");
            }));
        }
    });
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);

    // Writing `inner` re-runs only the inner effect.
    state.set("inner", Value::from(20));
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    let inner_runs = inner_effect
        .lock()
        .expect("slot lock")
        .as_ref()
        .expect("created")
        .run_count();
    assert_eq!(inner_runs, 2);

    // Writing `outer` re-runs only the outer effect.
    state.set("outer", Value::from(10));
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
}

/// Stopped effects are never notified again.
#[test]
fn stopped_effect_is_permanently_inactive() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("x", Value::from(0))]));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("x");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    effect.stop();
    state.set("x", Value::from(1));
    state.set("x", Value::from(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A scheduler receives the effect instead of it running synchronously;
/// re-running is the scheduler's decision.
#[test]
fn scheduler_defers_rerun_to_the_caller() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("x", Value::from(0))]));

    let queue: Arc<Mutex<Vec<Effect>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_clone = queue.clone();

    let seen = Arc::new(AtomicI32::new(-1));
    let seen_clone = seen.clone();
    let reader = state.clone();
    let effect = Effect::with_options(
        EffectOptions {
            scheduler: Some(Arc::new(move |e: &Effect| {
                queue_clone.lock().expect("queue lock").push(e.clone());
            })),
            ..EffectOptions::default()
        },
        move || {
            seen_clone.store(reader.get("x").as_i64().unwrap_or(-1) as i32, Ordering::SeqCst);
        },
    );
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(effect.run_count(), 1);

    // The write queues the effect; nothing runs yet.
    state.set("x", Value::from(7));
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(queue.lock().expect("queue lock").len(), 1);

    // Batched flush, the scheduler's contract.
    for queued in queue.lock().expect("queue lock").drain(..) {
        queued.run();
    }
    assert_eq!(seen.load(Ordering::SeqCst), 7);
}

/// An effect's own write does not re-enter it.
#[test]
fn self_triggering_write_does_not_recurse() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("n", Value::from(0))]));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let handle = state.clone();
    let effect = Effect::new(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let n = handle.get("n").as_i64().unwrap_or(0);
        // Reads and writes the same property.
        handle.set("n", Value::from(n + 1));
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(state.get("n"), Value::from(1));

    // An outside write still re-runs it, exactly once.
    state.set("n", Value::from(10));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(effect.run_count(), 2);
}

/// Untracked reads are pure passthroughs.
#[test]
fn untracked_reads_record_nothing() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("x", Value::from(1))]));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let _effect = Effect::new(move || {
        untracked(|| reader.get("x"));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("x", Value::from(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A panicking effect body must not leave a stale active-effect entry:
/// reads afterwards track nothing.
#[test]
fn panicking_effect_unwinds_the_context_stack() {
    let rt = Runtime::new();
    let state = wrap(&rt, Value::object_from([("x", Value::from(1))]));

    let armed = Arc::new(AtomicBool::new(true));
    let armed_clone = armed.clone();
    let reader = state.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _effect = Effect::new(move || {
            reader.get("x");
            if armed_clone.load(Ordering::SeqCst) {
                panic!("boom");
            }
        });
    }));
    assert!(result.is_err());
    armed.store(false, Ordering::SeqCst);

    // The stack unwound: this read happens outside any effect, so the
    // later write must not run anything (nothing to run would panic
    // anyway if the stack had leaked).
    assert_eq!(state.get("x"), Value::from(1));
    state.set("x", Value::from(2));
    assert_eq!(state.get("x"), Value::from(2));
}

/// Deep wrapping composes with collections and objects across levels.
#[test]
fn deep_updates_propagate_through_nested_wrappers() {
    let rt = Runtime::new();
    let state = wrap(
        &rt,
        Value::object_from([(
            "profile",
            Value::object_from([("name", Value::from("ada"))]),
        )]),
    );

    let seen: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let seen_clone = seen.clone();
    let reader = state.clone();
    let _effect = Effect::new(move || {
        let profile = reader.get("profile").into_observed().expect("wrapped");
        let name = profile.get("name");
        *seen_clone.lock().expect("seen lock") = name.as_str().unwrap_or("").to_owned();
    });
    assert_eq!(*seen.lock().expect("seen lock"), "ada");

    // Mutate through a separately obtained nested wrapper: identity
    // stability means it is the same wrapper the effect read through.
    let profile = state.get("profile").into_observed().expect("wrapped");
    profile.set("name", Value::from("grace"));
    assert_eq!(*seen.lock().expect("seen lock"), "grace");
}
