//! Integration Tests for Reactive System
//!
//! These tests verify that cells, computed values, effects and proxies work
//! together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::reactive::{
    reactive, untracked, Cell, Computed, Effect, EffectScope, ReactiveContext, ReactiveList,
    ReactiveObject, Runtime, SubscriberId, Value,
};
use trellis_core::ReactiveError;

/// Test that a computed value tracks cell dependencies.
#[test]
fn computed_tracks_cell_dependency() {
    let cell = Cell::new(10);

    let cell_clone = cell.clone();
    let computed = Computed::new(move || cell_clone.get() * 2);

    // First access computes the value
    assert_eq!(computed.get(), 20);

    // No manual invalidation needed
    cell.set(5);
    assert_eq!(computed.get(), 10);
}

/// Log scenario: an effect sees every change until it is stopped.
#[test]
fn effect_logs_until_stopped() {
    let cell = Cell::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let (cell_clone, log_clone) = (cell.clone(), log.clone());
    let effect = Effect::new(move || log_clone.lock().push(cell_clone.get()));
    assert_eq!(*log.lock(), vec![1]);

    cell.set(2);
    assert_eq!(*log.lock(), vec![1, 2]);

    effect.stop();
    cell.set(3);
    assert_eq!(*log.lock(), vec![1, 2]);
}

/// Test that computed values cache their result.
#[test]
fn computed_caches_expensive_computation() {
    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();

    let computed = Computed::new(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        42
    });

    // Nothing is computed before the first read
    assert_eq!(compute_count.load(Ordering::SeqCst), 0);

    // Subsequent accesses use cache
    assert_eq!(computed.get(), 42);
    assert_eq!(computed.get(), 42);
    assert_eq!(computed.get(), 42);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);
}

/// Test that computed values can depend on other computed values.
#[test]
fn computed_depends_on_computed() {
    let base = Cell::new(5);

    let base_clone = base.clone();
    let doubled = Computed::new(move || base_clone.get() * 2);

    let doubled_clone = doubled.clone();
    let plus_ten = Computed::new(move || doubled_clone.get() + 10);

    assert_eq!(plus_ten.get(), 20);

    base.set(10);
    assert_eq!(doubled.get(), 20);
    assert_eq!(plus_ten.get(), 30);
}

/// Test that writing a computed value without a setter fails.
#[test]
fn readonly_computed_rejects_writes() {
    let computed = Computed::new(|| 1);
    assert_eq!(computed.set(2), Err(ReactiveError::NotWritable));
}

/// Test that an effect's edges are exactly what its latest run read.
#[test]
fn effect_edges_are_recollected() {
    let toggle = Cell::new(true);
    let a = Cell::new(0);
    let b = Cell::new(0);

    let (t, a_clone, b_clone) = (toggle.clone(), a.clone(), b.clone());
    let effect = Effect::new(move || {
        if t.get() {
            a_clone.get()
        } else {
            b_clone.get()
        }
    });
    assert_eq!(effect.dependency_count(), 2);
    assert_eq!(a.subscriber_count(), 1);

    toggle.set(false);
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 1);
    assert_eq!(effect.dependency_count(), 2);
    effect.stop();
}

/// Test that ReactiveContext attributes reads to the innermost run.
#[test]
fn nested_reactive_contexts() {
    let outer_id = SubscriberId::new();
    let inner_id = SubscriberId::new();
    let outer_cell = Cell::new(1);
    let inner_cell = Cell::new(2);

    {
        let _outer_ctx = ReactiveContext::enter(outer_id);
        outer_cell.get();

        {
            let _inner_ctx = ReactiveContext::enter(inner_id);
            assert_eq!(ReactiveContext::current_subscriber(), Some(inner_id));
            inner_cell.get();
        }

        // Back to the outer context
        assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));
        untracked(|| inner_cell.get());
    }

    assert_eq!(Runtime::dependency_count(outer_id), 1);
    assert_eq!(Runtime::dependency_count(inner_id), 1);
    assert!(!ReactiveContext::is_tracking());

    Runtime::clear_dependencies(outer_id);
    Runtime::clear_dependencies(inner_id);
}

/// Test that a batch notifies each subscriber once.
#[test]
fn batch_deduplicates_notifications() {
    let state = reactive(&ReactiveObject::from_iter([("a", 1), ("b", 2)])).expect("extensible");

    let state_clone = state.clone();
    let effect = Effect::new(move || {
        state_clone.get("a");
        state_clone.get("b");
    });

    Runtime::batch(|| {
        state.set("a", 10).expect("writable");
        state.set("b", 20).expect("writable");
    });
    assert_eq!(effect.run_count(), 2);
    effect.stop();
}

/// Test that nested proxies are reactive down the whole tree.
#[test]
fn nested_mutation_reaches_deep_readers() {
    let leaf = ReactiveObject::from_iter([("value", 1)]);
    let middle = ReactiveObject::from_iter([("leaf", leaf)]);
    let root = reactive(&ReactiveObject::from_iter([("middle", middle)])).expect("extensible");

    let seen = Arc::new(AtomicI32::new(0));
    let (root_clone, seen_clone) = (root.clone(), seen.clone());
    let effect = Effect::new(move || {
        let value = root_clone
            .get("middle")
            .as_object()
            .map(|middle| middle.get("leaf"))
            .and_then(|leaf| leaf.as_object().map(|leaf| leaf.get("value")))
            .and_then(|value| value.as_f64())
            .unwrap_or_default();
        seen_clone.store(value as i32, Ordering::SeqCst);
    });

    let leaf = root.get("middle").as_object().map(|m| m.get("leaf"));
    let leaf = leaf.as_ref().and_then(Value::as_object).expect("leaf object");
    leaf.set("value", 3).expect("writable");

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    effect.stop();
}

/// Test that list length readers re-run on push.
#[test]
fn list_length_is_tracked() {
    let list = reactive(&ReactiveList::from_iter([1, 2])).expect("extensible");

    let len = Arc::new(AtomicI32::new(0));
    let (list_clone, len_clone) = (list.clone(), len.clone());
    let effect = Effect::new(move || {
        len_clone.store(list_clone.len() as i32, Ordering::SeqCst);
    });

    list.push(3).expect("writable");
    assert_eq!(len.load(Ordering::SeqCst), 3);
    effect.stop();
}

/// Test that a scope tears down everything created in it.
#[test]
fn scope_tears_down_effects_and_computed_readers() {
    let cell = Cell::new(0);
    let runs = Arc::new(AtomicI32::new(0));
    let scope = EffectScope::detached();

    scope.run(|| {
        for _ in 0..3 {
            let (cell_clone, runs_clone) = (cell.clone(), runs.clone());
            Effect::new(move || {
                cell_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
    });
    assert_eq!(scope.effect_count(), 3);
    assert_eq!(cell.subscriber_count(), 3);

    scope.stop();
    assert_eq!(cell.subscriber_count(), 0);

    cell.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}
