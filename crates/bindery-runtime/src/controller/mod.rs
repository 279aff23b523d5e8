#![forbid(unsafe_code)]

//! Controller lifecycle.
//!
//! A [`Controller`] owns one subtree of the host tree. Construction merges
//! the definition's defaults with per-instance overrides, flattens state,
//! config, computed keys and methods into one namespace, and builds the
//! derived cache. Mounting wires bindings, refs and events over the owned
//! subtree and starts structural observation.
//!
//! # Invariants
//!
//! 1. Lifecycle moves `Constructed → Mounted → Unmounted` and never back.
//!    Any other transition is a logged no-op.
//! 2. Every effect, listener and bus subscription the controller installs
//!    is registered as a cleanup under the node it belongs to, so removing
//!    a node or unmounting leaves nothing behind.
//! 3. Nodes under a nested controller root belong to that controller.
//!
//! # Failure Modes
//!
//! Only structurally invalid definitions fail construction. Unknown methods,
//! malformed declarations, apply failures and setter failures are logged and
//! isolated to the declaration that caused them.

mod def;
mod instance;
mod namespace;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bindery_core::{HostTree, Markup, MutationRecord, NodeId, Result, Store};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{binding, events, scope};

pub use def::{ControllerDef, Derivation, Hook, Method, Overrides};
pub use instance::{Cleanup, Instance};
pub use namespace::{Collision, Namespace, Slot};

pub(crate) use instance::InstanceInner;

/// Where a controller is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Constructed,
    Mounted,
    /// Terminal.
    Unmounted,
}

impl Lifecycle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Mounted => "mounted",
            Self::Unmounted => "unmounted",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A controller instance bound to a subtree.
#[derive(Clone, Debug)]
pub struct Controller {
    instance: Instance,
}

impl Controller {
    /// Build an instance over `root` with the default [`Markup`].
    pub fn new(
        def: &ControllerDef,
        tree: Rc<dyn HostTree>,
        root: NodeId,
        overrides: Overrides,
    ) -> Result<Self> {
        Self::with_markup(def, tree, root, overrides, Markup::default())
    }

    /// Build an instance over `root` using custom attribute conventions.
    pub fn with_markup(
        def: &ControllerDef,
        tree: Rc<dyn HostTree>,
        root: NodeId,
        overrides: Overrides,
        markup: Markup,
    ) -> Result<Self> {
        def.validate()?;
        let state = def::merge(&def.state, &overrides.state);
        let config = def::merge(&def.config, &overrides.config);

        let (namespace, collisions) = Namespace::build(def, &state, &config);
        for collision in &collisions {
            warn!(
                message = "controller.key_collision",
                controller = %def.name,
                key = %collision.key,
                kept = %collision.kept,
                skipped = %collision.skipped
            );
        }

        let methods: IndexMap<_, _> = def
            .methods
            .iter()
            .filter(|(key, _)| namespace.slot(key) == Some(Slot::Method))
            .map(|(key, method)| (key.clone(), Rc::clone(method)))
            .collect();

        let instance = Instance {
            inner: Rc::new(InstanceInner {
                name: def.name.clone(),
                tree,
                markup,
                root,
                state: Store::new(state),
                config,
                computed: Default::default(),
                namespace,
                methods,
                on_connect: def.on_connect.clone(),
                on_disconnect: def.on_disconnect.clone(),
                refs: RefCell::new(IndexMap::new()),
                cleanups: RefCell::new(IndexMap::new()),
                lifecycle: Cell::new(Lifecycle::Constructed),
                observer: Cell::new(None),
            }),
        };

        for key in instance.namespace().keys_of(Slot::Computed) {
            let Some(derive) = def.computed.get(key) else {
                continue;
            };
            let derive = Rc::clone(derive);
            let weak = instance.downgrade();
            instance.inner.computed.define(key, move || {
                weak.upgrade()
                    .map(|instance| derive(&instance))
                    .unwrap_or_default()
            });
        }

        debug!(
            message = "controller.constructed",
            controller = %def.name,
            root = %root,
            keys = instance.namespace().len()
        );
        Ok(Self { instance })
    }

    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.instance.lifecycle()
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.instance.root()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.instance.name()
    }

    /// Map refs, bind, wire events, observe structure, then run the connect
    /// hook. Returns `false` when the controller was not freshly constructed.
    pub fn mount(&self) -> bool {
        let instance = &self.instance;
        let inner = &instance.inner;
        if !transition(instance, Lifecycle::Constructed, Lifecycle::Mounted) {
            return false;
        }

        instance.map_refs();
        let bindings = binding::bind(instance, inner.root);
        let listeners = events::init_events(instance, inner.root);

        let weak = instance.downgrade();
        let observer = inner.tree.observe(
            inner.root,
            Rc::new(move |records: &[MutationRecord]| {
                if let Some(instance) = weak.upgrade() {
                    handle_mutations(&instance, records);
                }
            }),
        );
        inner.observer.set(Some(observer));

        if let Some(hook) = inner.on_connect.clone() {
            hook(instance);
        }
        debug!(
            message = "controller.mount",
            controller = %inner.name,
            root = %inner.root,
            bindings,
            listeners
        );
        true
    }

    /// Run the disconnect hook, stop observing, and run every registered
    /// cleanup. Returns `false` when the controller was not mounted.
    pub fn unmount(&self) -> bool {
        let instance = &self.instance;
        let inner = &instance.inner;
        if !transition(instance, Lifecycle::Mounted, Lifecycle::Unmounted) {
            return false;
        }

        if let Some(hook) = inner.on_disconnect.clone() {
            hook(instance);
        }
        if let Some(observer) = inner.observer.take() {
            inner.tree.disconnect(observer);
        }
        let cleanups = instance.cleanup_all();
        inner.computed.dispose_all();
        inner.refs.borrow_mut().clear();
        debug!(
            message = "controller.unmount",
            controller = %inner.name,
            root = %inner.root,
            cleanups
        );
        true
    }
}

fn transition(instance: &Instance, from: Lifecycle, to: Lifecycle) -> bool {
    let current = instance.lifecycle();
    if current != from {
        warn!(
            message = "controller.invalid_transition",
            controller = %instance.name(),
            from = %current,
            to = %to
        );
        return false;
    }
    instance.inner.lifecycle.set(to);
    true
}

/// Apply one batch of structural changes to a mounted instance.
///
/// Removed subtrees lose their cleanups. Inserted subtrees that this
/// controller owns are torn down (in case they were bound before a move)
/// and then bound and wired afresh. Refs are re-mapped once per batch.
pub(crate) fn handle_mutations(instance: &Instance, records: &[MutationRecord]) {
    if instance.lifecycle() != Lifecycle::Mounted {
        return;
    }
    let tree = instance.tree();
    let controller_attr = instance.markup().controller.clone();
    let mut touched = false;
    for record in records {
        for &node in &record.removed {
            let released = instance.cleanup_subtree(node);
            debug!(
                message = "controller.node_removed",
                controller = %instance.name(),
                node = %node,
                released
            );
            touched = true;
        }
        for &node in &record.added {
            if !tree.is_connected(node)
                || !scope::is_owned(&*tree, &controller_attr, instance.root(), node)
            {
                continue;
            }
            instance.cleanup_subtree(node);
            let bindings = binding::bind(instance, node);
            let listeners = events::init_events(instance, node);
            debug!(
                message = "controller.node_added",
                controller = %instance.name(),
                node = %node,
                bindings,
                listeners
            );
            touched = true;
        }
    }
    if touched {
        instance.map_refs();
    }
}
