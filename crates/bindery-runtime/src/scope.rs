#![forbid(unsafe_code)]

//! Controller ownership of nodes.
//!
//! A node belongs to the nearest enclosing controller root. Scans stop at
//! nested roots so that an outer controller never claims declarations meant
//! for an inner one.

use bindery_core::{HostTree, NodeId};

use crate::controller::Instance;

/// Whether `node` belongs to the controller rooted at `owner`: walking up
/// from `node`, `owner` is reached before any other controller root.
pub(crate) fn is_owned(
    tree: &dyn HostTree,
    controller_attr: &str,
    owner: NodeId,
    node: NodeId,
) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current == owner {
            return true;
        }
        if tree.attribute(current, controller_attr).is_some() {
            return false;
        }
        cursor = tree.parent(current);
    }
    false
}

/// `scope` and its descendants carrying `attribute` that belong to
/// `instance`, in document order.
pub(crate) fn scoped_nodes(instance: &Instance, scope: NodeId, attribute: &str) -> Vec<NodeId> {
    let tree = instance.tree();
    let controller_attr = &instance.markup().controller;
    let mut nodes = Vec::new();
    if tree.attribute(scope, attribute).is_some() {
        nodes.push(scope);
    }
    nodes.extend(tree.query_all(scope, attribute));
    nodes.retain(|node| is_owned(&*tree, controller_attr, instance.root(), *node));
    nodes
}
