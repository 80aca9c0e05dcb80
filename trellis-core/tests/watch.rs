//! Integration tests for watches.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::diagnostics::{self, Diagnostic};
use trellis_core::reactive::{
    mark_raw, reactive, watch, Cell, Computed, EffectScope, ReactiveObject, Value, WatchOptions,
};

fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let calls = Arc::new(AtomicI32::new(0));
    (calls.clone(), calls)
}

fn nested(depth: usize, leaf: i32) -> ReactiveObject {
    let mut current = ReactiveObject::from_iter([("value", leaf)]);
    for _ in 0..depth {
        current = ReactiveObject::from_iter([("child", current)]);
    }
    current
}

fn child(obj: &ReactiveObject) -> ReactiveObject {
    obj.get("child").as_object().cloned().unwrap_or_default()
}

/// Deep watch on a proxy fires on a change three levels down.
#[test]
fn deep_watch_sees_nested_changes() {
    let state = reactive(&nested(3, 1)).expect("extensible");
    let (calls, calls_clone) = counter();

    let handle = watch(
        state.clone(),
        move |_: &ReactiveObject, _: Option<&ReactiveObject>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    let leaf = child(&child(&child(&state)));
    leaf.set("value", 2).expect("writable");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    handle.stop();
}

/// A getter returning the same proxy does not fire on nested changes unless
/// the watch is deep.
#[test]
fn getter_source_is_shallow_unless_deep() {
    let state = reactive(&nested(3, 1)).expect("extensible");
    let (shallow_calls, shallow_clone) = counter();
    let (deep_calls, deep_clone) = counter();

    let getter_state = state.clone();
    let shallow = watch(
        move || getter_state.get("child"),
        move |_: &Value, _: Option<&Value>| {
            shallow_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    let getter_state = state.clone();
    let deep = watch(
        move || getter_state.get("child"),
        move |_: &Value, _: Option<&Value>| {
            deep_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default().deep(true),
    );

    let leaf = child(&child(&child(&state)));
    leaf.set("value", 5).expect("writable");

    assert_eq!(shallow_calls.load(Ordering::SeqCst), 0);
    assert_eq!(deep_calls.load(Ordering::SeqCst), 1);
    shallow.stop();
    deep.stop();
}

/// Watching a reactive object passes the same proxy as new and old value.
#[test]
fn reactive_object_watch_passes_identity() {
    let obj = reactive(&ReactiveObject::from_iter([("a", 1), ("b", 2)])).expect("extensible");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    let handle = watch(
        obj.clone(),
        move |new: &ReactiveObject, old: Option<&ReactiveObject>| {
            seen_clone.lock().push((new.clone(), old.cloned()));
        },
        WatchOptions::default(),
    );

    let b = obj.get("b").as_f64().unwrap_or_default();
    obj.set("b", b + 1.0).expect("writable");

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, obj);
    assert_eq!(seen[0].1.as_ref(), Some(&obj));
    handle.stop();
}

/// Multi-source watch reports per-slot changes.
#[test]
fn multi_source_watch_tracks_each_slot() {
    let a = Cell::new(1);
    let b = reactive(&ReactiveObject::from_iter([("n", 0)])).expect("extensible");
    let c = reactive(&ReactiveObject::from_iter([("x", 10)])).expect("extensible");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (c_clone, seen_clone) = (c.clone(), seen.clone());
    type Slots = (i32, ReactiveObject, Value);
    let handle = watch(
        (a.clone(), b.clone(), move || c_clone.get("x")),
        move |new: &Slots, old: Option<&Slots>| {
            let old = old.cloned();
            seen_clone.lock().push((new.clone(), old));
        },
        WatchOptions::default(),
    );

    a.set(2);
    c.set("x", 11).expect("writable");

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);

    let (new, old) = &seen[0];
    let old = old.as_ref().expect("old value recorded");
    assert_eq!((new.0, old.0), (2, 1));
    assert_eq!(new.2, old.2);

    let (new, old) = &seen[1];
    let old = old.as_ref().expect("old value recorded");
    assert_eq!(new.0, old.0);
    assert_eq!((new.2.clone(), old.2.clone()), (Value::from(11), Value::from(10)));
    handle.stop();
}

/// Vec sources behave like tuples.
#[test]
fn vec_source_fires_on_any_entry() {
    let cells = vec![Cell::new(1), Cell::new(2), Cell::new(3)];
    let (calls, calls_clone) = counter();

    let handle = watch(
        cells.clone(),
        move |new: &Vec<i32>, _: Option<&Vec<i32>>| {
            calls_clone.store(new.iter().sum(), Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    cells[1].set(20);
    assert_eq!(calls.load(Ordering::SeqCst), 24);
    handle.stop();
}

/// Computed sources fire only when the computed value changes.
#[test]
fn computed_source_fires_on_changed_value() {
    let n = Cell::new(1);
    let n_clone = n.clone();
    let parity = Computed::new(move || n_clone.get() % 2);
    let (calls, calls_clone) = counter();

    let handle = watch(
        parity,
        move |_: &i32, _: Option<&i32>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    n.set(3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    n.set(4);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    handle.stop();
}

/// Plain values are rejected with a diagnostic and never fire.
#[test]
fn invalid_sources_warn_and_stay_constant() {
    let (calls, calls_clone) = counter();
    let raw = mark_raw(ReactiveObject::from_iter([("n", 1)]));

    let (handle, warnings) = diagnostics::capture(|| {
        watch(
            Value::from(raw.clone()),
            move |_: &Value, _: Option<&Value>| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        )
    });

    assert!(matches!(
        warnings.as_slice(),
        [Diagnostic::InvalidWatchSource { .. }]
    ));
    raw.set("n", 2).expect("writable");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    handle.stop();
}

/// A deep watch does not descend into a child marked raw: mutating the child
/// stays silent while the root's own keys still fire.
#[test]
fn deep_watch_skips_raw_children() {
    let raw_child = mark_raw(ReactiveObject::from_iter([("n", 1)]));
    let root = reactive(&ReactiveObject::from_iter([
        ("child", Value::from(raw_child.clone())),
        ("count", Value::from(0)),
    ]))
    .expect("extensible");
    let (calls, calls_clone) = counter();

    let handle = watch(
        root.clone(),
        move |_: &ReactiveObject, _: Option<&ReactiveObject>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default().deep(true),
    );

    raw_child.set("n", 2).expect("writable");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The child read back through the root is the raw object itself
    let read_back = root.get("child").as_object().cloned().expect("object");
    read_back.set("n", 3).expect("writable");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    root.set("count", 1).expect("writable");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    handle.stop();
}

/// Watches created in a scope stop with it, running their cleanup once.
#[test]
fn scope_stops_watches_with_final_cleanup() {
    let cell = Cell::new(0);
    let (cleanups, cleanups_clone) = counter();
    let scope = EffectScope::detached();

    let handle = scope
        .run(|| {
            watch(
                cell.clone(),
                move |_: &i32, _: Option<&i32>| {
                    let cleanups = cleanups_clone.clone();
                    move || {
                        cleanups.fetch_add(1, Ordering::SeqCst);
                    }
                },
                WatchOptions::default().immediate(true),
            )
        })
        .expect("scope is active");

    scope.stop();
    assert!(!handle.is_active());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    cell.set(1);
    handle.stop();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}
