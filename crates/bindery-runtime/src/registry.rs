#![forbid(unsafe_code)]

//! Bootstrap: mount controllers on every declared root and follow structure.
//!
//! The registry maps controller names to definitions, mounts one
//! [`Controller`] per `data-controller` root when started, and then observes
//! the whole document: roots inserted later are mounted, roots removed are
//! unmounted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bindery_core::payload::parse_payload;
use bindery_core::{HostTree, Map, Markup, MutationRecord, NodeId, ObserverId, Result};
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::controller::{Controller, ControllerDef, Lifecycle, Overrides};

struct RegistryInner {
    tree: Rc<dyn HostTree>,
    markup: Markup,
    definitions: RefCell<IndexMap<String, ControllerDef>>,
    controllers: RefCell<IndexMap<NodeId, Controller>>,
    observer: Cell<Option<ObserverId>>,
}

/// Controller registry for one host tree.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    #[must_use]
    pub fn new(tree: Rc<dyn HostTree>) -> Self {
        Self::with_markup(tree, Markup::default())
    }

    #[must_use]
    pub fn with_markup(tree: Rc<dyn HostTree>, markup: Markup) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                tree,
                markup,
                definitions: RefCell::new(IndexMap::new()),
                controllers: RefCell::new(IndexMap::new()),
                observer: Cell::new(None),
            }),
        }
    }

    /// Register `def` under `name`. The definition is validated now, so a
    /// registered definition always constructs.
    pub fn register(&self, name: &str, mut def: ControllerDef) -> Result<()> {
        def.name = name.to_owned();
        def.validate()?;
        let replaced = self
            .inner
            .definitions
            .borrow_mut()
            .insert(name.to_owned(), def)
            .is_some();
        debug!(message = "registry.register", controller = name, replaced);
        Ok(())
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<String> {
        self.inner.definitions.borrow().keys().cloned().collect()
    }

    /// Mount every controller root currently in the document and start
    /// observing structure. Returns the number of controllers mounted.
    pub fn start(&self) -> usize {
        if self.inner.observer.get().is_some() {
            warn!(message = "registry.already_started");
            return 0;
        }
        let document = self.inner.tree.root();
        let mounted = self.mount_within(document);

        let weak = Rc::downgrade(&self.inner);
        let observer = self.inner.tree.observe(
            document,
            Rc::new(move |records: &[MutationRecord]| {
                if let Some(inner) = weak.upgrade() {
                    Registry { inner }.handle_mutations(records);
                }
            }),
        );
        self.inner.observer.set(Some(observer));
        info!(message = "registry.start", mounted);
        mounted
    }

    /// Stop observing and unmount every controller.
    pub fn stop(&self) -> usize {
        if let Some(observer) = self.inner.observer.take() {
            self.inner.tree.disconnect(observer);
        }
        let controllers: Vec<Controller> = self
            .inner
            .controllers
            .borrow_mut()
            .drain(..)
            .map(|(_, c)| c)
            .collect();
        let count = controllers.len();
        for controller in controllers {
            controller.unmount();
        }
        info!(message = "registry.stop", unmounted = count);
        count
    }

    /// Mounted controllers in mount order.
    #[must_use]
    pub fn controllers(&self) -> Vec<Controller> {
        self.inner.controllers.borrow().values().cloned().collect()
    }

    /// Controller owning `node`: the one rooted at its nearest enclosing
    /// controller root.
    #[must_use]
    pub fn controller_for(&self, node: NodeId) -> Option<Controller> {
        let root = self
            .inner
            .tree
            .closest_with_attribute(node, &self.inner.markup.controller)?;
        self.inner.controllers.borrow().get(&root).cloned()
    }

    fn mount_within(&self, scope: NodeId) -> usize {
        let tree = &self.inner.tree;
        let attr = &self.inner.markup.controller;
        let mut roots = Vec::new();
        if tree.attribute(scope, attr).is_some() {
            roots.push(scope);
        }
        roots.extend(tree.query_all(scope, attr));
        roots
            .into_iter()
            .filter(|root| self.mount_root(*root))
            .count()
    }

    fn mount_root(&self, root: NodeId) -> bool {
        if self.inner.controllers.borrow().contains_key(&root) {
            return false;
        }
        let tree = &self.inner.tree;
        let markup = &self.inner.markup;
        let name = tree
            .attribute(root, &markup.controller)
            .unwrap_or_default()
            .trim()
            .to_owned();
        let Some(def) = self.inner.definitions.borrow().get(&name).cloned() else {
            warn!(message = "registry.missing_definition", controller = %name, node = %root);
            return false;
        };
        let overrides = Overrides {
            state: self.payload(root, &markup.state),
            config: self.payload(root, &markup.config),
        };
        let controller = match Controller::with_markup(
            &def,
            Rc::clone(tree),
            root,
            overrides,
            markup.clone(),
        ) {
            Ok(controller) => controller,
            Err(err) => {
                error!(
                    message = "registry.construct_failed",
                    controller = %name,
                    node = %root,
                    error = %err
                );
                return false;
            }
        };
        self.inner
            .controllers
            .borrow_mut()
            .insert(root, controller.clone());
        controller.mount()
    }

    fn payload(&self, root: NodeId, attr: &str) -> Map {
        let Some(raw) = self.inner.tree.attribute(root, attr) else {
            return Map::new();
        };
        match parse_payload(&*self.inner.tree, &raw) {
            Ok(map) => map,
            Err(err) => {
                warn!(
                    message = "registry.malformed_payload",
                    node = %root,
                    attribute = attr,
                    error = %err
                );
                Map::new()
            }
        }
    }

    fn unmount_within(&self, removed: NodeId) -> usize {
        let tree = &self.inner.tree;
        let doomed: Vec<Controller> = {
            let mut controllers = self.inner.controllers.borrow_mut();
            let roots: Vec<NodeId> = controllers
                .keys()
                .copied()
                .filter(|root| tree.is_inclusive_descendant(*root, removed))
                .collect();
            let mut doomed = Vec::with_capacity(roots.len());
            for root in roots {
                doomed.extend(controllers.shift_remove(&root));
            }
            doomed
        };
        doomed
            .into_iter()
            .filter(|controller| controller.lifecycle() == Lifecycle::Mounted)
            .filter(Controller::unmount)
            .count()
    }

    fn handle_mutations(&self, records: &[MutationRecord]) {
        for record in records {
            for &node in &record.removed {
                let unmounted = self.unmount_within(node);
                if unmounted > 0 {
                    debug!(message = "registry.roots_removed", node = %node, unmounted);
                }
            }
            for &node in &record.added {
                if !self.inner.tree.is_connected(node) {
                    continue;
                }
                let mounted = self.mount_within(node);
                if mounted > 0 {
                    debug!(message = "registry.roots_added", node = %node, mounted);
                }
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("definitions", &self.definitions())
            .field("controllers", &self.inner.controllers.borrow().len())
            .field("started", &self.inner.observer.get().is_some())
            .finish()
    }
}
