#![forbid(unsafe_code)]

//! Fine-grained reactivity for bindery.
//!
//! This module provides the dependency-tracking primitives the binding layer
//! is built on:
//!
//! - [`run_effect`] / [`EffectHandle`]: a tracked unit of work that re-runs
//!   synchronously whenever a store key it read is written.
//! - [`Store`]: reactive handle over an [`Object`](crate::value::Object).
//!   Reads register the running effect, writes notify subscribers.
//! - [`DerivedCache`]: a store of computed values, each kept current by one
//!   effect.
//!
//! # Architecture
//!
//! Everything is single-threaded (`Rc<RefCell<..>>`). The stack of running
//! effects is thread-local; only the innermost effect collects dependencies.
//! Each object carries its own per-key subscriber table, allocated lazily on
//! first wrap, so wrapping is identity-stable and never outlives the object.
//!
//! # Invariants
//!
//! 1. Writing a value equal to the current one is a no-op (no notification).
//! 2. Subscribers of a key are notified in subscription order, from a snapshot
//!    taken before the first callback runs.
//! 3. Every run starts by leaving all subscriber sets joined by the previous
//!    run, so stale dependencies never fire.
//! 4. The effect stack is restored even if an effect body panics.
//! 5. A disposed effect never runs again.
//!
//! There is no batching: N writes produce N notification passes.

pub mod computed;
pub mod effect;
pub mod store;

pub use computed::DerivedCache;
pub use effect::{EffectHandle, is_tracking, run_effect, untracked};
pub use store::Store;
