//! Effect Scheduler
//!
//! The scheduler decouples writes from effect execution. Writes enqueue the
//! effects that observed them; a later flush runs the queue until no effect
//! reschedules anything.
//!
//! # Algorithm
//!
//! 1. When a cell changes, each dependent effect is pushed onto the pending
//!    queue. The queue deduplicates by node ID, so an effect observing five
//!    cells written in one burst still runs once.
//! 2. A flush drains the queue in waves: the current contents are snapshotted
//!    and cleared, then executed in insertion order. Effects that write cells
//!    land in the next wave.
//! 3. Waves repeat until the queue stays empty. A wave ceiling catches
//!    effects that keep rescheduling each other forever; past the ceiling the
//!    queue is discarded and the flush reports [`FlushOverrun`].
//!
//! Batching is a depth counter: while at least one batch is open, writes
//! still enqueue but the flush is not armed, so all effects deferred by the
//! batch run in one flush after the outermost batch exits.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use super::node::{panic_label, NodeId, ReactiveNode};

/// Number of drain waves a flush attempts before giving up.
pub const DEFAULT_FLUSH_LIMIT: usize = 100;

/// A flush ran its wave ceiling without the pending queue settling.
///
/// This means some effect (or a cycle of effects) kept writing cells that
/// reschedule effects, wave after wave. The queue has been discarded; the
/// runtime itself remains usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "flush did not settle after {limit} iterations; {pending} effect(s) were still pending \
     (an effect keeps rescheduling itself or another)"
)]
pub struct FlushOverrun {
    /// Effects still queued when the flush gave up.
    pub pending: usize,
    /// The iteration ceiling that was hit.
    pub limit: usize,
}

/// Deduplicating, insertion-ordered effect queue with batch support.
pub(crate) struct Scheduler {
    /// Effects awaiting the next flush, keyed by node ID for dedup.
    pending: Mutex<IndexMap<NodeId, Arc<ReactiveNode>>>,

    /// True while a drain is in progress. A drain requested from inside a
    /// running effect returns immediately; the outer loop picks up the work.
    flushing: AtomicBool,

    /// True once a flush has been requested and not yet started.
    scheduled: AtomicBool,

    /// Number of open batches. Writes inside a batch enqueue without arming.
    batch_depth: AtomicUsize,

    /// Wave ceiling for a single flush.
    limit: usize,

    /// Wakes embedders blocked on [`Scheduler::requested`].
    notify: Notify,
}

impl Scheduler {
    /// Create a scheduler with the default wave ceiling.
    pub(crate) fn new() -> Self {
        Self::with_limit(DEFAULT_FLUSH_LIMIT)
    }

    /// Create a scheduler with a custom wave ceiling.
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            pending: Mutex::new(IndexMap::new()),
            flushing: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            batch_depth: AtomicUsize::new(0),
            limit,
            notify: Notify::new(),
        }
    }

    /// The wave ceiling this scheduler flushes under.
    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Enqueue an effect for the next flush.
    ///
    /// Disposed nodes are refused, re-enqueueing is a no-op, and insertion
    /// order is first-enqueue order. Outside a batch and outside a running
    /// flush this also arms the flush.
    pub(crate) fn schedule(&self, node: Arc<ReactiveNode>) {
        if node.is_disposed() {
            return;
        }
        self.pending.lock().entry(node.id()).or_insert(node);
        if self.batch_depth.load(Ordering::SeqCst) == 0 && !self.flushing.load(Ordering::SeqCst) {
            self.arm();
        }
    }

    fn arm(&self) {
        if !self.scheduled.swap(true, Ordering::SeqCst) {
            tracing::trace!("flush armed");
            self.notify.notify_one();
        }
    }

    /// Whether any effect is queued.
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Whether a flush has been armed and not yet run.
    #[cfg(test)]
    pub(crate) fn flush_armed(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Resolve when a flush has been requested.
    ///
    /// Intended for embedder driver loops that wake up, flush, and go back
    /// to sleep. May complete spuriously after a flush already ran; the
    /// follow-up flush then drains an empty queue and returns immediately.
    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }

    /// Drain the pending queue until it stays empty.
    ///
    /// Re-entrant calls (from inside a running effect) return `Ok` at once;
    /// the nodes they would have drained are handled by the outer drain.
    /// Draining while a batch is open runs whatever has been deferred so
    /// far; the scheduler itself never arranges that.
    pub(crate) fn drain(&self) -> Result<(), FlushOverrun> {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.scheduled.store(false, Ordering::SeqCst);
        let result = self.run_to_empty();
        self.flushing.store(false, Ordering::SeqCst);
        result
    }

    fn run_to_empty(&self) -> Result<(), FlushOverrun> {
        let mut iterations = 0_usize;
        loop {
            let wave: Vec<Arc<ReactiveNode>> = {
                let mut pending = self.pending.lock();
                if pending.is_empty() {
                    return Ok(());
                }
                iterations += 1;
                if iterations > self.limit {
                    let remaining = pending.len();
                    pending.clear();
                    tracing::error!(
                        remaining,
                        limit = self.limit,
                        "flush wave ceiling exceeded, discarding pending effects"
                    );
                    return Err(FlushOverrun {
                        pending: remaining,
                        limit: self.limit,
                    });
                }
                pending.drain(..).map(|(_, node)| node).collect()
            };
            tracing::trace!(iteration = iterations, nodes = wave.len(), "flush wave");
            for node in wave {
                if node.is_disposed() {
                    continue;
                }
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| node.invoke())) {
                    tracing::error!(
                        node = node.id().raw(),
                        panic = %panic_label(&*payload),
                        "effect panicked during flush, continuing with remaining effects"
                    );
                }
            }
        }
    }

    pub(crate) fn enter_batch(&self) {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit_batch(&self) {
        let prev = self.batch_depth.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "unbalanced batch exit");
        if prev == 1 && !self.flushing.load(Ordering::SeqCst) && self.has_pending() {
            self.arm();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII batch scope. Entering bumps the batch depth; dropping restores it,
/// even when the batched closure panics.
pub(crate) struct BatchGuard<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn enter(scheduler: &'a Scheduler) -> Self {
        scheduler.enter_batch();
        Self { scheduler }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.exit_batch();
    }
}

/// Future returned by a flush request.
///
/// Draining happens on the first poll, so `flush().await` runs pending
/// effects at the await point of the caller's task rather than inside the
/// write that scheduled them.
#[must_use = "futures do nothing unless awaited"]
pub struct Flush<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> Flush<'a> {
    pub(crate) fn new(scheduler: &'a Scheduler) -> Self {
        Self { scheduler }
    }
}

impl Future for Flush<'_> {
    type Output = Result<(), FlushOverrun>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(self.scheduler.drain())
    }
}
