//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects, coordinated by a [`Runtime`]. These primitives form the
//! foundation of Trellis's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal's value is
//! read while an effect or computed is executing, the signal automatically
//! registers that computation as a dependent. When the signal's value
//! changes, dependents are notified; writes of a same value (per the cell's
//! [`Equality`] policy) notify nothing.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived, read-only cell that caches its result and
//! re-evaluates only when one of its dependencies has changed. Staleness
//! propagates through chains of computeds synchronously, inside the write,
//! so reads are always mutually consistent. Evaluation itself is lazy by
//! default and eager on request.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting subscription that reruns when its
//! dependencies change. Reruns are deferred: writes queue the effect on the
//! runtime's scheduler and a flush executes the queue, deduplicated, in
//! subscription order. Effects synchronize reactive state with external
//! systems, such as rendering or logging.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: the runtime keeps a stack of
//! currently executing nodes, and every tracked read links the cell to the
//! node on top. Each run re-collects dependencies from scratch, so
//! subscriptions always mirror the last execution's actual reads.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod effect;
mod equality;
mod runtime;
mod scope;
mod signal;

pub use computed::Computed;
pub use effect::Effect;
pub use equality::{Equality, SameValue};
pub use runtime::Runtime;
pub use scope::ScopeId;
pub use signal::Signal;
