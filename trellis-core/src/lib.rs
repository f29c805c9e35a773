//! Trellis Core
//!
//! This crate provides the core runtime for Trellis, a fine-grained
//! reactive state system. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic dependency tracking with per-run re-collection
//! - Synchronous staleness propagation through derived cells
//! - A batching, deduplicating effect scheduler with an overrun guard
//!
//! Update semantics are single-threaded: one runtime is driven from one
//! thread or async task. The types themselves are `Send + Sync` so handles
//! can be captured by closures and moved freely.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the public primitives (signals, computeds, effects,
//!   equality policies, scopes) and the [`reactive::Runtime`] that creates
//!   and coordinates them
//! - `graph`: the dependency graph underneath (nodes, edges, the effect
//!   scheduler, and flush errors)
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let count_clone = count.clone();
//! let doubled = rt.computed(move || count_clone.get() * 2);
//!
//! // Create an effect
//! let doubled_clone = doubled.clone();
//! rt.effect(move || {
//!     println!("Doubled: {}", doubled_clone.get());
//! });
//!
//! // Update the signal; the computed is fresh immediately...
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//!
//! // ...and the effect reruns on the next flush.
//! rt.flush().await?;
//! // Prints: "Doubled: 10"
//! ```

pub mod graph;
pub mod reactive;
