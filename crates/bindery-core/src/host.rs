#![forbid(unsafe_code)]

//! Host tree interface.
//!
//! The binding runtime never owns UI nodes. It talks to the host through
//! [`HostTree`]: attribute and content access, control state, event
//! listeners and dispatch, and batched structural-change notifications.
//!
//! All methods take `&self`; hosts are expected to use interior mutability,
//! because listeners and effects call back into the tree while other calls
//! are still on the stack. Implementations must not hold internal borrows
//! while invoking listeners or observers.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Opaque node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token returned by [`HostTree::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Token returned by [`HostTree::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

pub type Listener = Rc<dyn Fn(&HostEvent)>;
pub type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

/// One structural change: children added to or removed from `target`.
///
/// Only the roots of inserted/removed subtrees are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// An event travelling through the host tree.
pub struct HostEvent {
    name: String,
    target: NodeId,
    detail: Value,
    bubbles: bool,
    cancelable: bool,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    current_binding: Cell<Option<NodeId>>,
}

impl HostEvent {
    /// A non-bubbling, non-cancelable event targeted at `target`.
    #[must_use]
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            detail: Value::Null,
            bubbles: false,
            cancelable: false,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            current_binding: Cell::new(None),
        }
    }

    /// A bubbling, cancelable custom event carrying `detail`.
    #[must_use]
    pub fn custom(name: impl Into<String>, target: NodeId, detail: Value) -> Self {
        Self::new(name, target)
            .with_detail(detail)
            .bubbling(true)
            .cancelable(true)
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn bubbling(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    #[must_use]
    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn target(&self) -> NodeId {
        self.target
    }

    #[must_use]
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    #[must_use]
    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    /// Mark the default action as prevented. Ignored unless cancelable.
    pub fn prevent_default(&self) {
        if self.cancelable {
            self.default_prevented.set(true);
        }
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    /// Node whose declarative event binding is handling this event.
    #[must_use]
    pub fn current_binding(&self) -> Option<NodeId> {
        self.current_binding.get()
    }

    pub fn set_current_binding(&self, node: Option<NodeId>) {
        self.current_binding.set(node);
    }
}

impl fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEvent")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("detail", &self.detail)
            .field("bubbles", &self.bubbles)
            .field("cancelable", &self.cancelable)
            .field("default_prevented", &self.default_prevented.get())
            .finish()
    }
}

/// Operations the binding runtime needs from the host UI tree.
pub trait HostTree {
    /// Document root.
    fn root(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether `node` is currently attached under [`root`](Self::root).
    fn is_connected(&self, node: NodeId) -> bool;

    /// Descendants of `scope` (excluding `scope`) carrying `attribute`, in
    /// document order.
    fn query_all(&self, scope: NodeId, attribute: &str) -> Vec<NodeId>;

    fn by_id(&self, id: &str) -> Option<NodeId>;

    /// Lower-case tag name.
    fn tag_name(&self, node: NodeId) -> String;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    fn text_content(&self, node: NodeId) -> String;

    fn set_text_content(&self, node: NodeId, text: &str);

    fn inner_html(&self, node: NodeId) -> String;

    fn set_inner_html(&self, node: NodeId, html: &str);

    fn class_list(&self, node: NodeId) -> Vec<String>;

    fn toggle_class(&self, node: NodeId, class: &str, on: bool);

    fn style_property(&self, node: NodeId, property: &str) -> Option<String>;

    fn set_style_property(&self, node: NodeId, property: &str, value: &str);

    fn remove_style_property(&self, node: NodeId, property: &str);

    /// Replace the whole inline style.
    fn replace_style(&self, node: NodeId, css: &str);

    /// Current control value.
    fn value(&self, node: NodeId) -> String;

    fn set_value(&self, node: NodeId, value: &str);

    fn checked(&self, node: NodeId) -> bool;

    fn set_checked(&self, node: NodeId, checked: bool);

    fn listen(&self, node: NodeId, event: &str, listener: Listener) -> ListenerId;

    fn unlisten(&self, node: NodeId, listener: ListenerId);

    /// Deliver `event` to its target (and ancestors when bubbling). Returns
    /// `false` if a listener prevented the default action.
    fn dispatch(&self, event: &HostEvent) -> bool;

    /// Receive batched structural changes inside `root`'s subtree.
    ///
    /// Whether a change is inside the subtree is decided when it happens.
    /// Changes inside a subtree removed from `root` earlier in the same
    /// batch are still delivered.
    fn observe(&self, root: NodeId, callback: MutationCallback) -> ObserverId;

    fn disconnect(&self, observer: ObserverId);

    /// Whether `node` is `ancestor` or lies beneath it. Works on detached
    /// subtrees as long as the host keeps their internal links.
    fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Nearest inclusive ancestor of `node` carrying `attribute`.
    fn closest_with_attribute(&self, node: NodeId, attribute: &str) -> Option<NodeId> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if self.attribute(current, attribute).is_some() {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }
}
