//! Ownership Scopes
//!
//! A scope groups effects (and arbitrary cleanup callbacks) under one
//! identity so an embedder can tear down a whole region of reactivity at
//! once. A component-based UI maps one scope per component instance, and
//! unmounting the component disposes every effect the component created.
//!
//! Scopes are intentionally minimal: an ID, a registry, and a disposal
//! call. There is no nesting and no automatic propagation; an embedder
//! that wants hierarchical teardown registers child-scope disposal as a
//! cleanup callback on the parent.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::graph::panic_label;

/// Unique identifier for an ownership scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-runtime registry of scope cleanup callbacks.
pub(crate) struct ScopeRegistry {
    // The Mutex wrapper makes the registry (and thus `Runtime`) `Sync`:
    // `Box<dyn FnOnce() + Send>` is not `Sync`, and the `static` behind
    // `Runtime::global()` requires it.
    disposers: DashMap<ScopeId, Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
}

impl ScopeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            disposers: DashMap::new(),
        }
    }

    /// Attach a cleanup callback to a scope. Callbacks run in registration
    /// order when the scope is disposed.
    pub(crate) fn register(&self, scope: ScopeId, disposer: Box<dyn FnOnce() + Send>) {
        self.disposers.entry(scope).or_default().get_mut().push(disposer);
    }

    /// Dispose a scope, running all of its callbacks.
    ///
    /// Returns how many callbacks ran. Disposing an unknown or
    /// already-disposed scope is a no-op. A panicking callback is caught
    /// and logged; the remaining callbacks still run.
    pub(crate) fn dispose(&self, scope: ScopeId) -> usize {
        let disposers = match self.disposers.remove(&scope) {
            Some((_, disposers)) => disposers.into_inner(),
            None => return 0,
        };
        let count = disposers.len();
        for disposer in disposers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(disposer)) {
                tracing::error!(
                    scope = scope.raw(),
                    panic = %panic_label(&*payload),
                    "scope cleanup callback panicked, continuing with the rest"
                );
            }
        }
        count
    }

    /// Number of callbacks currently registered for a scope.
    #[cfg(test)]
    pub(crate) fn registered(&self, scope: ScopeId) -> usize {
        self.disposers.get(&scope).map_or(0, |entry| entry.lock().len())
    }
}
