//! Tracking Context
//!
//! The active-node stack records which node (effect or computed
//! dirty-marker) is currently executing. This enables automatic dependency
//! tracking: when a cell is read, the node on top of the stack is linked to
//! it, and only that node.
//!
//! # Implementation
//!
//! Each runtime owns one stack. Entering a node's execution pushes it and
//! returns a guard; dropping the guard pops. Because the pop lives in
//! `Drop`, the stack unwinds correctly even when the executing closure
//! panics, so a panic inside one effect cannot misattribute the reads of
//! the next.
//!
//! Nesting is natural: a computed read from inside an effect pushes its
//! marker on top of the effect, collects its own dependencies, and pops,
//! leaving the effect to collect the computed itself as a dependency.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::{DependentSet, NodeId, ReactiveNode};

/// The per-runtime stack of currently executing nodes.
pub(crate) struct ActiveStack {
    frames: RwLock<Vec<Arc<ReactiveNode>>>,
}

impl ActiveStack {
    /// Create an empty stack.
    pub(crate) fn new() -> Self {
        Self {
            frames: RwLock::new(Vec::new()),
        }
    }

    /// Push a node and return a guard that pops it on drop.
    pub(crate) fn enter(self: &Arc<Self>, node: Arc<ReactiveNode>) -> TrackingGuard {
        let id = node.id();
        self.frames.write().push(node);
        TrackingGuard {
            stack: Arc::clone(self),
            node: id,
        }
    }

    /// The node currently on top of the stack, if any.
    pub(crate) fn current(&self) -> Option<Arc<ReactiveNode>> {
        self.frames.read().last().cloned()
    }

    /// Whether any node is currently executing.
    pub(crate) fn is_tracking(&self) -> bool {
        !self.frames.read().is_empty()
    }

    /// Current nesting depth.
    pub(crate) fn depth(&self) -> usize {
        self.frames.read().len()
    }

    /// Link the top-of-stack node, if any, to the given cell.
    ///
    /// Called by cells on every tracked read. Reads outside any execution
    /// register nothing, and a node that disposed itself mid-run is never
    /// re-linked.
    pub(crate) fn track(&self, edges: &Arc<DependentSet>) {
        if let Some(node) = self.current() {
            if node.is_disposed() {
                return;
            }
            edges.insert(&node);
            node.link(edges);
        }
    }
}

impl std::fmt::Debug for ActiveStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStack")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Guard that pops the active-node stack when dropped.
///
/// Ensures the stack is properly unwound even if the computation panics.
pub(crate) struct TrackingGuard {
    stack: Arc<ActiveStack>,
    node: NodeId,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        let popped = self.stack.frames.write().pop();

        // Verify we're popping the node we pushed. This catches bugs where
        // guards are dropped out of order.
        if let Some(node) = popped {
            debug_assert_eq!(
                node.id(),
                self.node,
                "active-node stack popped out of order: expected {:?}, got {:?}",
                self.node,
                node.id()
            );
        }
    }
}
