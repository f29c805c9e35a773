//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a mutable cell that
//! remembers who read it and notifies them when its value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a node (effect or computed) is executing,
//!    the signal and that node are linked in both directions.
//!
//! 2. When a signal's value changes, dependents are walked in subscription
//!    order: computed dirty-markers run inline, effects are queued on the
//!    scheduler for the next flush.
//!
//! 3. Writes of a same value, as judged by the cell's equality policy, are
//!    complete no-ops. Nothing is notified and nothing is scheduled.
//!
//! # Thread Safety
//!
//! The runtime's semantics are single-threaded, but the types are `Send`
//! and `Sync`: the value sits behind a `RwLock` and edges behind mutexes,
//! so handles can be captured by closures and moved freely.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::{CellId, DependentSet, Scheduler};

use super::context::ActiveStack;
use super::equality::Equality;

/// A reactive cell holding a value of type T.
///
/// Handles are cheap to clone and share state. There is no distinct setter
/// handle; any clone may read or write.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(0);
///
/// // Read the value (tracked when inside an effect or computed)
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The current value.
    value: Arc<RwLock<T>>,

    /// Nodes that read this signal during their last run.
    dependents: Arc<DependentSet>,

    /// Policy deciding whether a write actually changes the value.
    equality: Equality<T>,

    /// The owning runtime's active-node stack, for read tracking.
    stack: Arc<ActiveStack>,

    /// The owning runtime's scheduler, for effect notification.
    scheduler: Arc<Scheduler>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal bound to a runtime's stack and scheduler.
    pub(crate) fn new(
        stack: Arc<ActiveStack>,
        scheduler: Arc<Scheduler>,
        value: T,
        equality: Equality<T>,
    ) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            dependents: Arc::new(DependentSet::new()),
            equality,
            stack,
            scheduler,
        }
    }

    /// Get the signal's unique cell ID.
    pub fn id(&self) -> CellId {
        self.dependents.cell()
    }

    /// Get the current value.
    ///
    /// If called while an effect or computed is executing, that node is
    /// registered as a dependent of this signal.
    pub fn get(&self) -> T {
        self.stack.track(&self.dependents);
        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    ///
    /// Use this inside an effect to consult a signal the effect should not
    /// rerun for.
    pub fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// The equality policy runs first, against the current value. If it
    /// reports the values are the same, the write is dropped entirely. If
    /// it panics, the panic propagates to the caller and the cell keeps its
    /// current value.
    pub fn set(&self, value: T) {
        let current = self.value.read().clone();
        if self.equality.same(&current, &value) {
            return;
        }

        // Store before notifying, so dependents running inline (computed
        // markers) and any re-entrant reads observe the new value.
        *self.value.write() = value;
        self.dependents.notify(&self.scheduler);
    }

    /// Update the value using a function of the current value.
    ///
    /// The function must be pure; it sees the current value and returns the
    /// next one, which then goes through the same path as [`Signal::set`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.value.read().clone();
        let next = f(&current);
        self.set(next);
    }

    /// Get the number of nodes currently depending on this signal.
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            dependents: Arc::clone(&self.dependents),
            equality: self.equality.clone(),
            stack: Arc::clone(&self.stack),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.peek())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
