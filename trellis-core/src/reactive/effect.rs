//! Effect Implementation
//!
//! An Effect is a side-effecting subscription that reruns whenever a cell
//! it read has changed.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    its initial dependencies.
//!
//! 2. When any dependency changes, the effect's node is queued on the
//!    scheduler; the rerun happens at the next flush, never inline in the
//!    write.
//!
//! 3. Each rerun severs the old dependency edges first and collects fresh
//!    ones during execution, so an effect only ever watches the cells its
//!    latest run actually read.
//!
//! # Panics
//!
//! A panic inside the effect function is caught at the effect boundary,
//! logged, and swallowed. The runtime's bookkeeping stays intact and the
//! effect keeps its subscriptions from before the failed run, so a later
//! change triggers it again.
//!
//! # Disposal
//!
//! Disposal is explicit via [`Effect::dispose`] or a scope; dropping the
//! handle does not dispose. A disposed effect never runs again, is
//! unlinked from every cell eagerly, and drops its closure, which breaks
//! reference cycles through captured cell handles.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::graph::{panic_label, NodeId, NodeKind, ReactiveNode};

use super::context::ActiveStack;

/// A side-effecting subscription that reruns when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(0);
///
/// let count_clone = count.clone();
/// let effect = runtime.effect(move || {
///     println!("Count is: {}", count_clone.get());
/// });
///
/// count.set(5);
/// runtime.flush().await?;  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    node: Arc<ReactiveNode>,
}

impl Effect {
    /// Create a new effect and run it once to establish dependencies.
    pub(crate) fn new<F>(stack: Arc<ActiveStack>, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let node = Arc::new_cyclic(|weak: &Weak<ReactiveNode>| {
            let weak = weak.clone();
            let body: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                let node = match weak.upgrade() {
                    Some(node) => node,
                    None => return,
                };

                // Unlink-then-run: subscriptions reflect exactly the reads
                // of this execution.
                node.clear_dependencies();
                let _tracking = stack.enter(Arc::clone(&node));

                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| run())) {
                    tracing::error!(
                        node = node.id().raw(),
                        panic = %panic_label(&*payload),
                        "effect panicked; it keeps its subscriptions and will rerun on the next change"
                    );
                }
            });
            ReactiveNode::new(NodeKind::Effect, body)
        });

        // First run happens right here, synchronously, in the creator.
        node.invoke();

        Self { node }
    }

    /// Get the effect's unique node ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Permanently stop the effect.
    ///
    /// Idempotent, and safe to call from inside the effect's own body. The
    /// effect is unlinked from every cell immediately; a pending scheduled
    /// run is skipped.
    pub fn dispose(&self) {
        self.node.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.node.is_disposed()
    }

    /// Get the number of cells the effect currently watches.
    pub fn dependency_count(&self) -> usize {
        self.node.dependency_count()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
