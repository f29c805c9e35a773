//! Graph Nodes and Edges
//!
//! This module defines the two halves of the bipartite dependency graph:
//!
//! - [`ReactiveNode`]: an executable unit, either an effect body or a
//!   computed's internal dirty-marker, that subscribes to cells.
//! - [`DependentSet`]: the type-erased half of a cell (signal or computed)
//!   holding the nodes that currently depend on it.
//!
//! An edge is mutual membership: the cell's `DependentSet` holds the node,
//! and the node's dependency map holds a weak handle back to the
//! `DependentSet`. Both sides are insertion-ordered, deduplicated maps keyed
//! by stable ids, so linking and unlinking are idempotent and the graph can
//! be torn down from either end without touching value types.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::scheduler::Scheduler;

/// Unique identifier for a cell (signal or computed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    /// Generate a new unique cell ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a node (effect or dirty-marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a node reacts when one of its cells changes.
///
/// The tag is explicit on every node, never inferred from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// A computed's internal dirty-marker. Invoked inline during the write
    /// that changed the cell, so invalidation crosses chains of computeds
    /// before the write returns.
    Marker,

    /// An ordinary effect. Never run inline; handed to the scheduler and
    /// executed on the next flush.
    Effect,
}

/// An executable subscriber in the dependency graph.
///
/// The node owns its behavior as an erased closure plus the set of cells it
/// is currently linked to. Disposal is permanent and idempotent: it severs
/// every edge in both directions and drops the behavior closure, which also
/// breaks any reference cycle running through captured cell handles.
pub(crate) struct ReactiveNode {
    id: NodeId,
    kind: NodeKind,
    disposed: AtomicBool,
    body: RwLock<Option<Arc<dyn Fn() + Send + Sync>>>,
    /// Cells this node is registered with, keyed by cell ID. Weak on this
    /// side: a node must never keep a dead cell alive.
    dependencies: Mutex<IndexMap<CellId, Weak<DependentSet>>>,
}

impl ReactiveNode {
    /// Create a new node with the given kind and behavior.
    pub(crate) fn new(kind: NodeKind, body: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            disposed: AtomicBool::new(false),
            body: RwLock::new(Some(body)),
            dependencies: Mutex::new(IndexMap::new()),
        }
    }

    /// Get the node's ID.
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Check whether the node has been disposed.
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Run the node's behavior, unless it has been disposed.
    ///
    /// The closure is cloned out of the node before the call so the node may
    /// dispose itself from within its own execution.
    pub(crate) fn invoke(&self) {
        if self.is_disposed() {
            return;
        }
        let body = self.body.read().clone();
        if let Some(body) = body {
            body();
        }
    }

    /// Record that this node depends on the given cell.
    ///
    /// Inserting an existing edge is a no-op. The matching direction (the
    /// cell holding the node) is maintained by the caller.
    pub(crate) fn link(&self, edges: &Arc<DependentSet>) {
        self.dependencies
            .lock()
            .entry(edges.cell())
            .or_insert_with(|| Arc::downgrade(edges));
    }

    /// Sever this node's edges in both directions.
    ///
    /// Every run of an effect and every recomputation of a computed starts
    /// here: dependencies are re-collected from scratch, so branches not
    /// taken this time drop their subscriptions.
    pub(crate) fn clear_dependencies(&self) {
        let drained: SmallVec<[Weak<DependentSet>; 4]> = {
            let mut dependencies = self.dependencies.lock();
            dependencies.drain(..).map(|(_, edges)| edges).collect()
        };
        for edges in drained {
            if let Some(edges) = edges.upgrade() {
                edges.remove(self.id);
            }
        }
    }

    /// Permanently deactivate the node.
    ///
    /// Idempotent and safe to call from within the node's own execution.
    /// Unlinks eagerly rather than merely flagging, and drops the behavior
    /// closure so captured cell handles are released immediately.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.clear_dependencies();
        *self.body.write() = None;
    }

    /// Number of cells this node is currently linked to.
    pub(crate) fn dependency_count(&self) -> usize {
        self.dependencies.lock().len()
    }
}

impl std::fmt::Debug for ReactiveNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// The set of nodes depending on one cell.
///
/// This is the only part of a cell the graph layer ever sees: value storage
/// and equality live with the typed cell, while edges and change
/// notification are handled here, erased.
pub(crate) struct DependentSet {
    cell: CellId,
    nodes: Mutex<IndexMap<NodeId, Arc<ReactiveNode>>>,
}

impl DependentSet {
    /// Create an empty dependent set with a fresh cell identity.
    pub(crate) fn new() -> Self {
        Self {
            cell: CellId::new(),
            nodes: Mutex::new(IndexMap::new()),
        }
    }

    /// The owning cell's ID.
    pub(crate) fn cell(&self) -> CellId {
        self.cell
    }

    /// Add a dependent node. Adding twice is a no-op set insertion.
    pub(crate) fn insert(&self, node: &Arc<ReactiveNode>) {
        self.nodes
            .lock()
            .entry(node.id())
            .or_insert_with(|| Arc::clone(node));
    }

    /// Remove a dependent node. Removing a non-member is a no-op.
    ///
    /// Removal preserves the order of the remaining entries, so
    /// notification order stays the subscription order.
    pub(crate) fn remove(&self, id: NodeId) {
        self.nodes.lock().shift_remove(&id);
    }

    /// Clone out the current dependents, in subscription order.
    ///
    /// Notification always walks a snapshot: a dependent's execution may
    /// dispose itself or its siblings, and that must not invalidate the
    /// walk.
    pub(crate) fn snapshot(&self) -> SmallVec<[Arc<ReactiveNode>; 4]> {
        self.nodes.lock().values().cloned().collect()
    }

    /// Number of dependents.
    pub(crate) fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Whether the given node is currently a dependent.
    #[cfg(test)]
    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.lock().contains_key(&id)
    }

    /// Notify every dependent that this cell's value changed.
    ///
    /// Walks a snapshot in subscription order: disposed nodes are unlinked
    /// and skipped, markers run inline (a panicking chain is logged and the
    /// walk continues), effects are handed to the scheduler.
    pub(crate) fn notify(&self, scheduler: &Scheduler) {
        for node in self.snapshot() {
            if node.is_disposed() {
                self.remove(node.id());
                continue;
            }
            match node.kind() {
                NodeKind::Marker => {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| node.invoke())) {
                        tracing::error!(
                            node = node.id().raw(),
                            cell = self.cell.raw(),
                            panic = %panic_label(&*payload),
                            "dirty-marker propagation panicked, continuing with remaining dependents"
                        );
                    }
                }
                NodeKind::Effect => scheduler.schedule(node),
            }
        }
    }
}

impl std::fmt::Debug for DependentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentSet")
            .field("cell", &self.cell)
            .field("len", &self.len())
            .finish()
    }
}

/// Best-effort extraction of a panic message for logging.
pub(crate) fn panic_label(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
