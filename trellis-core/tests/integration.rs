//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that signals, computeds, effects, batching, and the
//! flush cycle work together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use trellis_core::graph::DEFAULT_FLUSH_LIMIT;
use trellis_core::reactive::{Effect, Equality, Runtime, ScopeId};

/// An effect runs once at creation, then once per flush after a change.
#[tokio::test]
async fn effect_logs_initial_then_updated_value() {
    let rt = Runtime::new();
    let count = rt.signal(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let count_clone = count.clone();
    let log_clone = log.clone();
    let _logger = rt.effect(move || {
        log_clone.lock().push(count_clone.get());
    });

    assert_eq!(*log.lock(), vec![1]);

    count.set(2);
    assert_eq!(*log.lock(), vec![1], "the rerun waits for the flush");

    rt.flush().await.unwrap();
    assert_eq!(*log.lock(), vec![1, 2]);
}

/// Derived values are fresh immediately after the write; only effects wait
/// for the flush.
#[tokio::test]
async fn computed_chain_is_fresh_before_any_flush() {
    let rt = Runtime::new();
    let base = rt.signal(1);

    let base_clone = base.clone();
    let doubled = rt.computed(move || base_clone.get() * 2);

    let doubled_clone = doubled.clone();
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    let _logger = rt.effect(move || {
        log_clone.lock().push(doubled_clone.get());
    });

    assert_eq!(*log.lock(), vec![2]);

    base.set(10);

    // No flush yet: reads are already consistent.
    assert_eq!(doubled.get(), 20);
    assert_eq!(*log.lock(), vec![2]);

    rt.flush().await.unwrap();
    assert_eq!(*log.lock(), vec![2, 20]);
}

/// Computeds chain to arbitrary depth without a flush in between.
#[test]
fn deep_chain_stays_consistent() {
    let rt = Runtime::new();
    let base = rt.signal(1);

    let base_clone = base.clone();
    let a = rt.computed(move || base_clone.get() + 1);
    let a_clone = a.clone();
    let b = rt.computed(move || a_clone.get() * 10);
    let b_clone = b.clone();
    let c = rt.computed(move || b_clone.get() - 3);

    assert_eq!(c.get(), 17);

    base.set(4);
    assert_eq!(c.get(), 47);
    assert_eq!(b.get(), 50);
    assert_eq!(a.get(), 5);
}

/// One flush, one rerun, no matter how many watched cells changed.
#[test]
fn effect_reruns_once_for_multiple_changed_cells() {
    let rt = Runtime::new();
    let first = rt.signal(1);
    let second = rt.signal(10);
    let runs = Arc::new(AtomicI32::new(0));

    let (first_clone, second_clone) = (first.clone(), second.clone());
    let runs_clone = runs.clone();
    let _sum = rt.effect(move || {
        first_clone.get();
        second_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    first.set(2);
    second.set(20);
    rt.flush_now().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2, "initial run plus one rerun");
}

/// An effect watching both a signal and a computed derived from it still
/// reruns only once per flush.
#[test]
fn effect_watching_signal_and_derived_runs_once() {
    let rt = Runtime::new();
    let base = rt.signal(1);

    let base_clone = base.clone();
    let doubled = rt.computed(move || base_clone.get() * 2);

    let runs = Arc::new(AtomicI32::new(0));
    let (base_clone, doubled_clone) = (base.clone(), doubled.clone());
    let runs_clone = runs.clone();
    let _both = rt.effect(move || {
        base_clone.get();
        doubled_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // The write reaches the effect twice: directly, and through the
    // computed's invalidation. The queue deduplicates.
    base.set(3);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Batched writes coalesce into one rerun that sees the final values.
#[tokio::test]
async fn batch_coalesces_writes_into_one_rerun() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let b = rt.signal(100);
    let log = Arc::new(Mutex::new(Vec::new()));

    let (a_clone, b_clone) = (a.clone(), b.clone());
    let log_clone = log.clone();
    let _sum = rt.effect(move || {
        log_clone.lock().push(a_clone.get() + b_clone.get());
    });

    assert_eq!(*log.lock(), vec![101]);

    rt.batch(|| {
        a.set(2);
        a.set(3);
        b.set(200);
        assert_eq!(*log.lock(), vec![101], "no rerun inside the batch");
    });

    rt.flush().await.unwrap();
    assert_eq!(*log.lock(), vec![101, 203], "one rerun, last write wins");
}

/// Inner batches do not release the deferral; only the outermost exit does.
#[test]
fn nested_batches_defer_until_the_outermost_exit() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        source_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    rt.batch(|| {
        source.set(1);
        rt.batch(|| {
            source.set(2);
        });
        // Inner batch closed, outer still open.
        assert!(rt.flush_pending());
        source.set(3);
    });

    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Reads inside a batch still see fresh derived values; batching defers
/// effects, not staleness propagation.
#[test]
fn computed_reads_inside_a_batch_are_fresh() {
    let rt = Runtime::new();
    let base = rt.signal(1);

    let base_clone = base.clone();
    let squared = rt.computed(move || {
        let v = base_clone.get();
        v * v
    });
    assert_eq!(squared.get(), 1);

    rt.batch(|| {
        base.set(5);
        assert_eq!(squared.get(), 25);
        base.set(6);
        assert_eq!(squared.get(), 36);
    });
}

/// Writing a value the equality policy considers the same schedules
/// nothing at all.
#[test]
fn same_value_write_schedules_nothing() {
    let rt = Runtime::new();
    let value = rt.signal(f64::NAN);
    let runs = Arc::new(AtomicI32::new(0));

    let value_clone = value.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        value_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // NaN to NaN is a no-op under the default policy.
    value.set(f64::NAN);
    assert!(!rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Negative zero is a different value than positive zero.
    value.set(0.0);
    rt.flush_now().unwrap();
    value.set(-0.0);
    assert!(rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// A `PartialEq`-based policy opts back into IEEE float comparison.
#[test]
fn partial_eq_policy_changes_float_semantics() {
    let rt = Runtime::new();
    let value = rt.signal_with(0.0_f64, Equality::partial_eq());
    let runs = Arc::new(AtomicI32::new(0));

    let value_clone = value.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        value_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // -0.0 == 0.0 under PartialEq: no change.
    value.set(-0.0);
    assert!(!rt.flush_pending());

    // NaN != NaN under PartialEq: every write counts.
    value.set(f64::NAN);
    rt.flush_now().unwrap();
    value.set(f64::NAN);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// An eager computed that re-evaluates to an equal value spares its
/// effects entirely.
#[test]
fn eager_equality_cutoff_spares_downstream_effects() {
    let rt = Runtime::new();
    let raw = rt.signal(20);

    let raw_clone = raw.clone();
    let clamped = rt.computed_eager(move || raw_clone.get().min(10));

    let runs = Arc::new(AtomicI32::new(0));
    let clamped_clone = clamped.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        clamped_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // 20 -> 30 recomputes the clamp inline; 10 == 10, so the effect is
    // never even scheduled.
    raw.set(30);
    assert!(!rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    raw.set(5);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(clamped.get(), 5);
}

/// A lazy computed invalidation wakes its effects even when the eventual
/// recompute lands on an equal value.
#[test]
fn lazy_invalidation_wakes_effects_before_the_cutoff() {
    let rt = Runtime::new();
    let raw = rt.signal(20);

    let raw_clone = raw.clone();
    let clamped = rt.computed(move || raw_clone.get().min(10));

    let runs = Arc::new(AtomicI32::new(0));
    let clamped_clone = clamped.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        clamped_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Going stale is all it takes to schedule; the rerun then observes the
    // unchanged value.
    raw.set(30);
    assert!(rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(clamped.get(), 10);
}

/// Reads through `peek` do not subscribe.
#[test]
fn peek_inside_an_effect_does_not_subscribe() {
    let rt = Runtime::new();
    let watched = rt.signal(1);
    let peeked = rt.signal(100);
    let log = Arc::new(Mutex::new(Vec::new()));

    let (watched_clone, peeked_clone) = (watched.clone(), peeked.clone());
    let log_clone = log.clone();
    let _effect = rt.effect(move || {
        log_clone.lock().push(watched_clone.get() + peeked_clone.peek());
    });

    assert_eq!(*log.lock(), vec![101]);
    assert_eq!(peeked.dependent_count(), 0);

    peeked.set(200);
    assert!(!rt.flush_pending());

    // The peeked change becomes visible when a watched cell triggers.
    watched.set(2);
    rt.flush_now().unwrap();
    assert_eq!(*log.lock(), vec![101, 202]);
}

/// Subscriptions follow the last run: a branch switch drops the abandoned
/// cell entirely.
#[test]
fn dynamic_dependencies_follow_the_latest_run() {
    let rt = Runtime::new();
    let use_first = rt.signal(true);
    let first = rt.signal(1);
    let second = rt.signal(10);
    let runs = Arc::new(AtomicI32::new(0));

    let (use_first_c, first_c, second_c) = (use_first.clone(), first.clone(), second.clone());
    let runs_clone = runs.clone();
    let _chooser = rt.effect(move || {
        if use_first_c.get() {
            first_c.get();
        } else {
            second_c.get();
        }
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Not watched yet: no rerun.
    second.set(11);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    use_first.set(false);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(first.dependent_count(), 0);

    // The abandoned branch no longer schedules anything.
    first.set(2);
    assert!(!rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    second.set(12);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Effects that keep rescheduling each other trip the wave ceiling and
/// surface it as an error naming the limit.
#[tokio::test]
async fn flush_overrun_reports_the_ceiling() {
    let rt = Runtime::new();
    let counter = rt.signal(0);

    let counter_clone = counter.clone();
    let _runaway = rt.effect(move || {
        let value = counter_clone.get();
        counter_clone.set(value + 1);
    });

    let err = rt.flush().await.unwrap_err();
    assert_eq!(err.limit, DEFAULT_FLUSH_LIMIT);
    assert_eq!(err.pending, 1);
    assert!(err.to_string().contains("100"));
}

/// An overrun discards the queue but leaves the runtime fully usable.
#[test]
fn runtime_survives_an_overrun() {
    let rt = Runtime::with_flush_limit(3);
    let counter = rt.signal(0);

    let counter_clone = counter.clone();
    let runaway = rt.effect(move || {
        counter_clone.update(|v| v + 1);
    });

    assert!(rt.flush_now().is_err());
    runaway.dispose();

    let calm = rt.signal(0);
    let runs = Arc::new(AtomicI32::new(0));
    let calm_clone = calm.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        calm_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    calm.set(1);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// An effect disposed by an earlier effect in the same flush never runs.
#[test]
fn disposal_during_a_flush_skips_the_pending_run() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let victim_runs = Arc::new(AtomicI32::new(0));
    let victim_slot: Arc<OnceLock<Effect>> = Arc::new(OnceLock::new());

    // Subscribed first, so it runs first in the wave.
    let source_clone = source.clone();
    let slot_clone = victim_slot.clone();
    let _killer = rt.effect(move || {
        source_clone.get();
        if let Some(victim) = slot_clone.get() {
            victim.dispose();
        }
    });

    let source_clone = source.clone();
    let victim_runs_clone = victim_runs.clone();
    let victim = rt.effect(move || {
        source_clone.get();
        victim_runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    victim_slot.set(victim.clone()).ok();

    source.set(1);
    rt.flush_now().unwrap();

    assert!(victim.is_disposed());
    assert_eq!(
        victim_runs.load(Ordering::SeqCst),
        1,
        "only the initial run; the queued rerun was cancelled"
    );

    source.set(2);
    rt.flush_now().unwrap();
    assert_eq!(victim_runs.load(Ordering::SeqCst), 1);
}

/// A panicking effect is contained: siblings run, state stays consistent,
/// and the panicking effect itself recovers on the next change.
#[test]
fn panicking_effect_does_not_take_down_the_flush() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let sibling_runs = Arc::new(AtomicI32::new(0));

    let source_clone = source.clone();
    let _fragile = rt.effect(move || {
        if source_clone.get() == 1 {
            panic!("cannot handle one");
        }
    });

    let source_clone = source.clone();
    let sibling_clone = sibling_runs.clone();
    let _sibling = rt.effect(move || {
        source_clone.get();
        sibling_clone.fetch_add(1, Ordering::SeqCst);
    });

    source.set(1);
    rt.flush_now().unwrap();
    assert_eq!(sibling_runs.load(Ordering::SeqCst), 2);

    // The fragile effect is still subscribed and recovers.
    source.set(2);
    rt.flush_now().unwrap();
    assert_eq!(sibling_runs.load(Ordering::SeqCst), 3);
    assert_eq!(source.dependent_count(), 2);
}

/// An eager computed that panics while re-evaluating inside a write is
/// contained there; sibling subscribers of the same cell still hear the
/// change, and the computed recovers on the next one.
#[test]
fn panicking_eager_computed_spares_siblings() {
    let rt = Runtime::new();
    let source = rt.signal(0);

    let source_clone = source.clone();
    let fragile = rt.computed_eager(move || {
        let v = source_clone.get();
        if v == 1 {
            panic!("cannot derive from one");
        }
        v * 2
    });

    let runs = Arc::new(AtomicI32::new(0));
    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let _sibling = rt.effect(move || {
        source_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // The eager re-evaluation panics inside this write; the write itself
    // returns normally and the sibling is still scheduled.
    source.set(1);
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    source.set(2);
    rt.flush_now().unwrap();
    assert_eq!(fragile.get(), 4);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Disposing a scope tears down every member effect and runs cleanups,
/// even when one of them panics.
#[test]
fn scope_teardown_stops_all_member_effects() {
    let rt = Runtime::new();
    let scope = ScopeId::new();
    let source = rt.signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let first = rt.effect_scoped(scope, move || {
        source_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    rt.on_scope_dispose(scope, || panic!("cleanup failed"));

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let second = rt.effect_scoped(scope, move || {
        source_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The panicking cleanup between them stops neither disposal.
    rt.dispose_scope(scope);
    assert!(first.is_disposed());
    assert!(second.is_disposed());

    source.set(1);
    assert!(!rt.flush_pending());
    rt.flush_now().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Embedders can sleep until a write requests a flush.
#[tokio::test]
async fn flush_requested_wakes_an_embedder_loop() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let seen = Arc::new(AtomicI32::new(-1));

    let source_clone = source.clone();
    let seen_clone = seen.clone();
    let _mirror = rt.effect(move || {
        seen_clone.store(source_clone.get(), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    // Nothing armed: the wait idles out.
    let idle = tokio::time::timeout(Duration::from_millis(20), rt.flush_requested()).await;
    assert!(idle.is_err());

    source.set(5);
    tokio::time::timeout(Duration::from_millis(200), rt.flush_requested())
        .await
        .expect("a write must wake the embedder");

    rt.flush().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

/// `update` composes read and write through the same no-op and notify
/// rules as `set`.
#[test]
fn update_goes_through_the_same_write_path() {
    let rt = Runtime::new();
    let value = rt.signal(10);
    let runs = Arc::new(AtomicI32::new(0));

    let value_clone = value.clone();
    let runs_clone = runs.clone();
    let _watcher = rt.effect(move || {
        value_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    value.update(|v| *v);
    assert!(!rt.flush_pending());

    value.update(|v| v + 1);
    rt.flush_now().unwrap();
    assert_eq!(value.peek(), 11);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
