//! Computed Implementation
//!
//! A Computed is a read-only cell whose value is derived from other cells.
//! It caches its result and re-evaluates only when something it read has
//! changed.
//!
//! # How Computeds Work
//!
//! 1. The computed owns a hidden dirty-marker node. While the compute
//!    function runs, the marker sits on the active-node stack, so every cell
//!    the function reads links to the marker.
//!
//! 2. When any of those cells changes, the marker runs inline, during the
//!    write. A lazy computed just flags itself stale and passes the
//!    notification on to its own dependents; an eager one re-evaluates on
//!    the spot.
//!
//! 3. A read of a stale computed re-evaluates before returning, so chains of
//!    computeds are always mutually consistent with no flush in between.
//!
//! 4. If re-evaluation produces a same value under the cell's equality
//!    policy, dependents are not notified and the update stops there.
//!
//! # Why Inline Markers
//!
//! Effects are deferred to the scheduler, but staleness is not: if marking
//! were deferred too, reading `b` (derived from `a`) right after writing `a`
//! would return a stale cached value. Markers ride the write itself, so by
//! the time `set` returns, every transitively affected computed knows it is
//! dirty.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::graph::{CellId, DependentSet, NodeKind, ReactiveNode, Scheduler};

use super::context::ActiveStack;
use super::equality::Equality;

/// Clears an atomic flag when dropped, including during unwinding.
struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A cached derived cell that re-evaluates only when its inputs change.
///
/// There is no setter: a computed's value comes exclusively from its
/// compute function. Handles are cheap to clone and share state.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    state: Arc<ComputedState<T>>,
}

struct ComputedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The cached value (None until the first evaluation finishes).
    value: RwLock<Option<T>>,

    /// True when the cache may be stale and the next read must re-evaluate.
    dirty: AtomicBool,

    /// True while the compute function is running. A marker firing or a
    /// re-entrant read during evaluation must not start a second one.
    computing: AtomicBool,

    /// Eager computeds re-evaluate inside the write that invalidated them
    /// instead of waiting for the next read.
    eager: bool,

    /// Policy deciding whether a recomputed value counts as a change.
    equality: Equality<T>,

    /// The derivation. Must be pure apart from reading cells.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// Nodes that read this computed during their last run.
    dependents: Arc<DependentSet>,

    /// The hidden dirty-marker registered with every cell the compute
    /// function reads.
    marker: Arc<ReactiveNode>,

    stack: Arc<ActiveStack>,
    scheduler: Arc<Scheduler>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed bound to a runtime's stack and scheduler.
    ///
    /// Lazy computeds do not run `compute` until first read. Eager ones run
    /// it here, so a panic in the first evaluation propagates to the
    /// creator.
    pub(crate) fn new<F>(
        stack: Arc<ActiveStack>,
        scheduler: Arc<Scheduler>,
        compute: F,
        equality: Equality<T>,
        eager: bool,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let state = Arc::new_cyclic(|weak: &Weak<ComputedState<T>>| {
            let marker_body: Arc<dyn Fn() + Send + Sync> = {
                let weak = weak.clone();
                Arc::new(move || {
                    if let Some(state) = weak.upgrade() {
                        ComputedState::marker_fired(&state);
                    }
                })
            };
            ComputedState {
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                computing: AtomicBool::new(false),
                eager,
                equality,
                compute: Box::new(compute),
                dependents: Arc::new(DependentSet::new()),
                marker: Arc::new(ReactiveNode::new(NodeKind::Marker, marker_body)),
                stack,
                scheduler,
            }
        });

        if eager {
            ComputedState::recompute(&state);
        }

        Self { state }
    }

    /// Get the computed's unique cell ID.
    pub fn id(&self) -> CellId {
        self.state.dependents.cell()
    }

    /// Get the current value, re-evaluating first if the cache is stale.
    ///
    /// If called while an effect or computed is executing, that node is
    /// registered as a dependent of this computed.
    ///
    /// # Panics
    ///
    /// Panics if called from inside this computed's own compute function
    /// before the first evaluation has produced a value (a dependency
    /// cycle), and propagates any panic raised by the compute function.
    pub fn get(&self) -> T {
        if self.state.dirty.load(Ordering::SeqCst) {
            ComputedState::recompute(&self.state);
        }
        self.state.stack.track(&self.state.dependents);
        self.state
            .value
            .read()
            .clone()
            .expect("computed read during its own first evaluation (dependency cycle)")
    }

    /// Get the current value without registering a dependency.
    ///
    /// Still re-evaluates if the cache is stale; peeking never returns a
    /// stale value.
    pub fn peek(&self) -> T {
        if self.state.dirty.load(Ordering::SeqCst) {
            ComputedState::recompute(&self.state);
        }
        self.state
            .value
            .read()
            .clone()
            .expect("computed read during its own first evaluation (dependency cycle)")
    }

    /// Get the number of nodes currently depending on this computed.
    pub fn dependent_count(&self) -> usize {
        self.state.dependents.len()
    }

    /// Check if the computed has evaluated at least once.
    pub fn has_value(&self) -> bool {
        self.state.value.read().is_some()
    }
}

impl<T> ComputedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Entry point for the dirty-marker: one of the cells read by the last
    /// evaluation has changed.
    fn marker_fired(state: &Arc<Self>) {
        if state.eager {
            state.dirty.store(true, Ordering::SeqCst);
            Self::recompute(state);
        } else if !state.dirty.swap(true, Ordering::SeqCst) {
            // Newly stale: pass the invalidation downstream. Already-stale
            // computeds told their dependents the first time; repeating the
            // walk would be redundant and lets marker cycles terminate.
            state.dependents.notify(&state.scheduler);
        }
    }

    /// Run the compute function and reconcile the cache.
    fn recompute(state: &Arc<Self>) {
        if state.computing.swap(true, Ordering::SeqCst) {
            return;
        }
        let computing = ResetOnDrop(&state.computing);

        // Dependencies are re-collected from scratch each evaluation, so
        // cells behind branches not taken this time drop their edges.
        state.marker.clear_dependencies();
        let tracking = state.stack.enter(Arc::clone(&state.marker));

        // A panic here unwinds through the guards: the marker is popped,
        // the computing flag cleared, and the cell stays dirty for retry.
        let next = (state.compute)();

        let cached = state.value.read().clone();
        let changed = match cached.as_ref() {
            Some(previous) => !state.equality.same(previous, &next),
            None => true,
        };

        if changed {
            // Store before notifying so dependents re-reading this cell
            // inline observe the fresh value.
            *state.value.write() = Some(next);
            state.dependents.notify(&state.scheduler);
        }

        state.dirty.store(false, Ordering::SeqCst);
        drop(tracking);
        drop(computing);
    }
}

impl<T> Drop for ComputedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Unlink the marker from every source eagerly; a dropped computed
        // must not linger in its sources' dependent sets.
        self.marker.dispose();
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.state.dirty.load(Ordering::SeqCst))
            .field("eager", &self.state.eager)
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
