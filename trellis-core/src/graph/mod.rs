//! Dependency Graph
//!
//! This module implements the dependency graph that connects reactive cells
//! to the computations observing them, and the scheduler that runs deferred
//! effects.
//!
//! # Overview
//!
//! The graph is bipartite: cells (signals and computeds) on one side,
//! executable nodes (effects and computed dirty-markers) on the other. An
//! edge means "this node read that cell during its last run".
//!
//! When a cell changes, its dependents are walked in subscription order.
//! Dirty-markers run inline so staleness crosses chains of computeds within
//! the write itself; effects are pushed onto the scheduler's deduplicating
//! queue and run on the next flush.
//!
//! # Design Decisions
//!
//! 1. Edges are distributed rather than held in one central graph: each
//!    cell owns its dependent set, each node owns its dependency map. Cells
//!    and nodes can then be created, shared, and dropped independently with
//!    no registry to keep in sync.
//!
//! 2. Both edge directions are insertion-ordered maps keyed by stable ids,
//!    so membership updates are O(1), re-linking is idempotent, and
//!    notification order is deterministic.
//!
//! 3. Cells hold their dependents strongly while nodes hold cells weakly.
//!    Ownership flows one way, and disposing a node breaks the closure
//!    cycles that keep subgraphs alive.

mod node;
mod scheduler;

pub use node::{CellId, NodeId};
pub use scheduler::{Flush, FlushOverrun, DEFAULT_FLUSH_LIMIT};

pub(crate) use node::{panic_label, DependentSet, NodeKind, ReactiveNode};
pub(crate) use scheduler::{BatchGuard, Scheduler};
