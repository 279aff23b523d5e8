#![forbid(unsafe_code)]

//! Core of bindery: the value model, fine-grained reactivity, and the host
//! tree interface the binding runtime talks to.
//!
//! # Modules
//!
//! - [`value`]: [`Value`] and the shared [`Object`] map.
//! - [`reactive`]: effect scheduler, reactive [`Store`], [`DerivedCache`].
//! - [`host`]: the [`HostTree`] trait, events, and mutation records.
//! - [`memory_tree`]: an in-memory [`HostTree`].
//! - [`markup`]: attribute conventions and declaration parsing.
//! - [`payload`]: per-instance override payload parsing.

pub mod error;
pub mod host;
pub mod markup;
pub mod memory_tree;
pub mod payload;
pub mod reactive;
pub mod value;

pub use error::{BinderyError, Result};
pub use host::{
    HostEvent, HostTree, Listener, ListenerId, MutationCallback, MutationRecord, NodeId,
    ObserverId,
};
pub use markup::{BindingDecl, BindingKind, Direction, EventDecl, Markup};
pub use memory_tree::MemoryTree;
pub use reactive::{DerivedCache, EffectHandle, Store, is_tracking, run_effect, untracked};
pub use value::{Map, Object, Value};
