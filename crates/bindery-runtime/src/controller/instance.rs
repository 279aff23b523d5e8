#![forbid(unsafe_code)]

//! The controller instance: namespace access, refs, and per-node cleanups.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bindery_core::{
    BinderyError, DerivedCache, HostEvent, HostTree, Map, Markup, NodeId, ObserverId, Result,
    Store, Value,
};
use indexmap::IndexMap;
use tracing::warn;

use super::Lifecycle;
use super::def::{Hook, Method};
use super::namespace::{Namespace, Slot};
use crate::bus::{self, SubscriberError};
use crate::scope;

/// Disposer registered against a node.
pub type Cleanup = Box<dyn FnOnce()>;

pub(crate) struct InstanceInner {
    pub(crate) name: String,
    pub(crate) tree: Rc<dyn HostTree>,
    pub(crate) markup: Markup,
    pub(crate) root: NodeId,
    pub(crate) state: Store,
    pub(crate) config: Map,
    pub(crate) computed: DerivedCache,
    pub(crate) namespace: Namespace,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) on_connect: Option<Hook>,
    pub(crate) on_disconnect: Option<Hook>,
    pub(crate) refs: RefCell<IndexMap<String, NodeId>>,
    pub(crate) cleanups: RefCell<IndexMap<NodeId, Vec<Cleanup>>>,
    pub(crate) lifecycle: Cell<Lifecycle>,
    pub(crate) observer: Cell<Option<ObserverId>>,
}

/// Shared handle to one controller instance.
///
/// This is the receiver handed to methods, derivations and hooks. Cloning
/// yields another handle to the same instance.
#[derive(Clone)]
pub struct Instance {
    pub(crate) inner: Rc<InstanceInner>,
}

/// Non-owning handle captured by effects and listeners.
#[derive(Clone)]
pub(crate) struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub(crate) fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

impl Instance {
    pub(crate) fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.inner))
    }

    /// Controller name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    #[must_use]
    pub fn tree(&self) -> Rc<dyn HostTree> {
        Rc::clone(&self.inner.tree)
    }

    #[must_use]
    pub fn markup(&self) -> &Markup {
        &self.inner.markup
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    /// The reactive state store.
    #[must_use]
    pub fn state(&self) -> &Store {
        &self.inner.state
    }

    #[must_use]
    pub fn computed_cache(&self) -> &DerivedCache {
        &self.inner.computed
    }

    /// Resolve `path` through the namespace.
    ///
    /// State and computed reads are tracked; config reads are plain; a method
    /// is invoked as a zero-argument accessor. Remaining path segments walk
    /// into nested objects. Unknown keys read as `Null`.
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        let (head, rest) = split_path(path);
        let value = match self.inner.namespace.slot(head) {
            Some(Slot::State) => self.inner.state.get(head),
            Some(Slot::Computed) => self.inner.computed.get(head),
            Some(Slot::Config) => self.inner.config.get(head).cloned().unwrap_or_default(),
            Some(Slot::Method) => self.call(head, None).unwrap_or_default(),
            None => return Value::Null,
        };
        match rest {
            None => value,
            Some(rest) => match value {
                Value::Object(obj) => Store::wrap(&obj).get_path(rest),
                _ => Value::Null,
            },
        }
    }

    /// Write `value` at `path`. Only state keys (and paths into state
    /// objects) are writable. Returns whether subscribers were notified.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let (head, rest) = split_path(path);
        match self.inner.namespace.slot(head) {
            Some(Slot::State) => match rest {
                None => Ok(self.inner.state.set(head, value)),
                Some(_) => self.inner.state.set_path(path, value),
            },
            Some(slot) => Err(BinderyError::NotWritable {
                key: head.to_owned(),
                slot: slot.as_str(),
            }),
            None => Err(BinderyError::UnknownKey {
                key: head.to_owned(),
            }),
        }
    }

    /// Plain config read.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<Value> {
        match self.inner.namespace.slot(key) {
            Some(Slot::Config) => self.inner.config.get(key).cloned(),
            _ => None,
        }
    }

    /// Cached computed value (tracked).
    #[must_use]
    pub fn computed(&self, key: &str) -> Value {
        match self.inner.namespace.slot(key) {
            Some(Slot::Computed) => self.inner.computed.get(key),
            _ => Value::Null,
        }
    }

    /// Whether `name` resolves to a method.
    #[must_use]
    pub fn is_callable(&self, name: &str) -> bool {
        self.inner.namespace.slot(name) == Some(Slot::Method)
    }

    /// Invoke method `name`. `None` when `name` is not a method.
    pub fn call(&self, name: &str, event: Option<&HostEvent>) -> Option<Value> {
        if !self.is_callable(name) {
            return None;
        }
        let method = Rc::clone(self.inner.methods.get(name)?);
        Some(method(self, event))
    }

    /// Snapshot of the ref map.
    #[must_use]
    pub fn refs(&self) -> IndexMap<String, NodeId> {
        self.inner.refs.borrow().clone()
    }

    #[must_use]
    pub fn ref_node(&self, name: &str) -> Option<NodeId> {
        self.inner.refs.borrow().get(name).copied()
    }

    /// Dispatch a bubbling, cancelable custom event from the root. Returns
    /// `false` if a listener prevented the default.
    pub fn dispatch(&self, name: &str, detail: impl Into<Value>) -> bool {
        let event = HostEvent::custom(name, self.inner.root, detail.into());
        self.inner.tree.dispatch(&event)
    }

    /// Subscribe to the global event bus for the lifetime of this instance;
    /// the subscription is cancelled on unmount.
    pub fn on_bus(
        &self,
        event: &str,
        callback: impl Fn(&Value) -> std::result::Result<(), SubscriberError> + 'static,
    ) {
        let subscription = bus::global().on(event, callback);
        self.add_cleanup(
            self.inner.root,
            Box::new(move || {
                subscription.cancel();
            }),
        );
    }

    /// Number of nodes with registered cleanups.
    #[must_use]
    pub fn tracked_nodes(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    /// Number of cleanups registered for `node`.
    #[must_use]
    pub fn cleanup_count(&self, node: NodeId) -> usize {
        self.inner.cleanups.borrow().get(&node).map_or(0, Vec::len)
    }

    pub(crate) fn add_cleanup(&self, node: NodeId, cleanup: Cleanup) {
        self.inner
            .cleanups
            .borrow_mut()
            .entry(node)
            .or_default()
            .push(cleanup);
    }

    /// Run and forget every cleanup registered under `node` or a descendant.
    pub(crate) fn cleanup_subtree(&self, node: NodeId) -> usize {
        let tree = &self.inner.tree;
        let drained: Vec<Cleanup> = {
            let mut cleanups = self.inner.cleanups.borrow_mut();
            let owned: Vec<NodeId> = cleanups
                .keys()
                .copied()
                .filter(|n| tree.is_inclusive_descendant(*n, node))
                .collect();
            let mut drained = Vec::new();
            for n in owned {
                drained.extend(cleanups.shift_remove(&n).into_iter().flatten());
            }
            drained
        };
        let count = drained.len();
        for cleanup in drained {
            cleanup();
        }
        count
    }

    pub(crate) fn cleanup_all(&self) -> usize {
        let drained: Vec<Cleanup> = std::mem::take(&mut *self.inner.cleanups.borrow_mut())
            .into_values()
            .flatten()
            .collect();
        let count = drained.len();
        for cleanup in drained {
            cleanup();
        }
        count
    }

    /// Rebuild the ref map from the controller's own scope. Later nodes win.
    pub(crate) fn map_refs(&self) {
        let attr = &self.inner.markup.reference;
        let mut refs = IndexMap::new();
        for node in scope::scoped_nodes(self, self.inner.root, attr) {
            if let Some(name) = self.inner.tree.attribute(node, attr) {
                let name = name.trim();
                if name.is_empty() {
                    warn!(
                        message = "controller.empty_ref",
                        controller = %self.inner.name,
                        node = %node
                    );
                    continue;
                }
                refs.insert(name.to_owned(), node);
            }
        }
        *self.inner.refs.borrow_mut() = refs;
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("lifecycle", &self.inner.lifecycle.get())
            .field("namespace", &self.inner.namespace)
            .finish()
    }
}
