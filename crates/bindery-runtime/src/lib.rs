#![forbid(unsafe_code)]

//! Declarative controllers over a host tree.
//!
//! A controller owns a subtree marked with `data-controller`. Inside it,
//! `data-bind` / `data-model` declarations become effects over the
//! controller's reactive state, `data-on` declarations wire events to
//! methods, and `data-ref` names nodes. Structural changes inside the
//! subtree are followed automatically.
//!
//! # Modules
//!
//! - [`controller`]: definitions, namespace flattening, lifecycle.
//! - [`binding`]: the update policy and two-way control conversion.
//! - [`bus`]: named-event publish/subscribe.
//! - [`registry`]: mounts controllers on declared roots.

pub mod binding;
pub mod bus;
pub mod controller;
mod events;
pub mod registry;
mod scope;

pub use binding::{ControlKind, apply};
pub use bus::{BusCallback, BusSubscription, EventBus, SubscriberError};
pub use controller::{
    Cleanup, Collision, Controller, ControllerDef, Derivation, Hook, Instance, Lifecycle, Method,
    Namespace, Overrides, Slot,
};
pub use registry::Registry;
