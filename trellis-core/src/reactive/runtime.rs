//! Reactive Runtime
//!
//! The runtime is the entry point that ties the pieces together: it owns
//! the active-node stack used for dependency tracking, the scheduler that
//! defers effects, and the scope registry. Cells and effects created
//! through a runtime are wired to that runtime and no other.
//!
//! # How It Works
//!
//! 1. Cells are created through the runtime, which hands each one the
//!    runtime's stack and scheduler.
//!
//! 2. While an effect or computed executes, the stack records it; cells it
//!    reads link themselves to it.
//!
//! 3. When a cell's value changes, computed dirty-markers run inline and
//!    dependent effects land on the scheduler.
//!
//! 4. A flush, requested through the runtime, drains the scheduler.
//!
//! Multiple runtimes coexist without sharing anything. For applications
//! that want ambient reactivity there is [`Runtime::global`].
//!
//! # Threading
//!
//! Handles are `Send + Sync` and everything is internally locked, but the
//! design point is confinement: one runtime driven from one thread (or one
//! async task). Update semantics are sequential, and nothing here arranges
//! cross-thread ordering.

use std::sync::{Arc, OnceLock};

use crate::graph::{BatchGuard, Flush, FlushOverrun, Scheduler};

use super::computed::Computed;
use super::context::ActiveStack;
use super::effect::Effect;
use super::equality::{Equality, SameValue};
use super::scope::{ScopeId, ScopeRegistry};
use super::signal::Signal;

/// Coordinates tracking, scheduling, and scopes for one reactive graph.
///
/// Cloning a `Runtime` is cheap and yields another handle to the same
/// graph.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let count_clone = count.clone();
/// let _logger = rt.effect(move || {
///     println!("count = {}", count_clone.get());
/// });
///
/// count.set(1);
/// rt.flush().await?;
/// ```
pub struct Runtime {
    stack: Arc<ActiveStack>,
    scheduler: Arc<Scheduler>,
    scopes: Arc<ScopeRegistry>,
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    /// Create a fresh, empty runtime.
    pub fn new() -> Self {
        Self::with_flush_limit(crate::graph::DEFAULT_FLUSH_LIMIT)
    }

    /// Create a runtime whose flushes give up after `limit` waves.
    pub fn with_flush_limit(limit: usize) -> Self {
        Self {
            stack: Arc::new(ActiveStack::new()),
            scheduler: Arc::new(Scheduler::with_limit(limit)),
            scopes: Arc::new(ScopeRegistry::new()),
        }
    }

    /// The process-wide default runtime.
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(Runtime::new)
    }

    // ------------------------------------------------------------------
    // Cell and effect constructors
    // ------------------------------------------------------------------

    /// Create a mutable cell with the default equality policy.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + Send + Sync + SameValue + 'static,
    {
        Signal::new(
            Arc::clone(&self.stack),
            Arc::clone(&self.scheduler),
            value,
            Equality::default(),
        )
    }

    /// Create a mutable cell with an explicit equality policy.
    pub fn signal_with<T>(&self, value: T, equality: Equality<T>) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Signal::new(
            Arc::clone(&self.stack),
            Arc::clone(&self.scheduler),
            value,
            equality,
        )
    }

    /// Create a lazy derived cell with the default equality policy.
    ///
    /// The compute function does not run until the cell is first read.
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + Send + Sync + SameValue + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.computed_with(compute, Equality::default())
    }

    /// Create a lazy derived cell with an explicit equality policy.
    pub fn computed_with<T, F>(&self, compute: F, equality: Equality<T>) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(
            Arc::clone(&self.stack),
            Arc::clone(&self.scheduler),
            compute,
            equality,
            false,
        )
    }

    /// Create an eager derived cell with the default equality policy.
    ///
    /// Eager computeds evaluate here, at creation, and again inside every
    /// write that invalidates them. A panic in the compute function
    /// propagates to this call.
    pub fn computed_eager<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + Send + Sync + SameValue + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.computed_eager_with(compute, Equality::default())
    }

    /// Create an eager derived cell with an explicit equality policy.
    pub fn computed_eager_with<T, F>(&self, compute: F, equality: Equality<T>) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(
            Arc::clone(&self.stack),
            Arc::clone(&self.scheduler),
            compute,
            equality,
            true,
        )
    }

    /// Create an effect. It runs once immediately to establish its
    /// dependencies, then reruns on flushes after those change.
    pub fn effect<F>(&self, run: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new(Arc::clone(&self.stack), run)
    }

    /// Create an effect owned by a scope; disposing the scope disposes the
    /// effect.
    pub fn effect_scoped<F>(&self, scope: ScopeId, run: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = self.effect(run);
        let handle = effect.clone();
        self.scopes
            .register(scope, Box::new(move || handle.dispose()));
        effect
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Register a cleanup callback to run when `scope` is disposed.
    pub fn on_scope_dispose<F>(&self, scope: ScopeId, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.scopes.register(scope, Box::new(f));
    }

    /// Dispose a scope: every effect and cleanup callback registered under
    /// it runs, in registration order. Idempotent.
    pub fn dispose_scope(&self, scope: ScopeId) {
        let count = self.scopes.dispose(scope);
        if count > 0 {
            tracing::debug!(scope = scope.raw(), callbacks = count, "scope disposed");
        }
    }

    // ------------------------------------------------------------------
    // Batching and flushing
    // ------------------------------------------------------------------

    /// Run `f` with effect flushing deferred.
    ///
    /// Writes inside the batch propagate to computeds immediately (reads
    /// stay consistent), but dependent effects are only queued. They run in
    /// one deduplicated flush after the outermost batch exits. Batches
    /// nest, and the depth unwinds correctly if `f` panics.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter(&self.scheduler);
        f()
    }

    /// Run all pending effects at the caller's next await point.
    ///
    /// Resolves with `Ok(())` once the queue has settled, or with
    /// [`FlushOverrun`] if effects kept rescheduling each other past the
    /// runtime's wave limit.
    pub fn flush(&self) -> Flush<'_> {
        Flush::new(&self.scheduler)
    }

    /// Synchronous [`Runtime::flush`], for callers outside any async
    /// context.
    pub fn flush_now(&self) -> Result<(), FlushOverrun> {
        self.scheduler.drain()
    }

    /// Wait until some write has requested a flush.
    ///
    /// This is the hook for embedders that drive flushing from their own
    /// loop: await this, flush, repeat. May complete spuriously after a
    /// flush has already run; the extra flush finds an empty queue.
    pub async fn flush_requested(&self) {
        self.scheduler.requested().await;
    }

    /// Whether any effect is queued for the next flush.
    pub fn flush_pending(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// The wave ceiling this runtime's flushes run under.
    pub fn flush_limit(&self) -> usize {
        self.scheduler.limit()
    }

    /// Whether an effect or computed is currently executing.
    pub fn is_tracking(&self) -> bool {
        self.stack.is_tracking()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        Self {
            stack: Arc::clone(&self.stack),
            scheduler: Arc::clone(&self.scheduler),
            scopes: Arc::clone(&self.scopes),
        }
    }
}
