#![forbid(unsafe_code)]

//! In-memory [`HostTree`] for headless hosts and tests.
//!
//! # Model
//!
//! Every node has a tag, ordered attributes, its own text (text children are
//! not modelled), an optional markup string, and control state
//! (`value`/`checked`). `class` and `style` live in their attributes, so
//! class toggles and style merges are visible through
//! [`attribute`](HostTree::attribute) as well.
//!
//! Structural changes are queued and delivered to observers only when
//! [`MemoryTree::flush`] is called, one batch per round, mirroring how a
//! browser hands mutation records to observers after the current task.
//! Recipients are decided when a record is queued. A subtree removed from an
//! observed scope stays observed until the next flush, so changes made inside
//! it in the same round still reach the observer.
//!
//! User input is simulated with [`MemoryTree::input`],
//! [`MemoryTree::toggle`], [`MemoryTree::choose`] and [`MemoryTree::click`],
//! which update control state and then dispatch the event a real control
//! would fire.

use std::cell::RefCell;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::host::{
    HostEvent, HostTree, Listener, ListenerId, MutationCallback, MutationRecord, NodeId,
    ObserverId,
};

struct NodeData {
    tag: String,
    attributes: IndexMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: String,
    html: Option<String>,
    value: String,
    checked: bool,
    listeners: Vec<(ListenerId, String, Listener)>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            parent: None,
            children: Vec::new(),
            text: String::new(),
            html: None,
            value: String::new(),
            checked: false,
            listeners: Vec::new(),
        }
    }
}

/// A queued record and the observers it will be delivered to.
struct Queued {
    record: MutationRecord,
    recipients: Vec<ObserverId>,
}

struct TreeState {
    nodes: AHashMap<NodeId, NodeData>,
    root: NodeId,
    next_node: u64,
    next_listener: u64,
    next_observer: u64,
    observers: Vec<(ObserverId, NodeId, MutationCallback)>,
    /// Subtrees removed this round, still observed until the next flush.
    transient: Vec<(ObserverId, NodeId)>,
    pending: Vec<Queued>,
    writes: u64,
}

impl TreeState {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(&id)
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.node(current).and_then(|n| n.parent);
        }
        false
    }

    fn recipients(&self, target: NodeId) -> Vec<ObserverId> {
        self.observers
            .iter()
            .filter(|(id, root, _)| {
                self.contains(*root, target)
                    || self
                        .transient
                        .iter()
                        .any(|(tid, removed)| tid == id && self.contains(*removed, target))
            })
            .map(|(id, _, _)| *id)
            .collect()
    }

    fn queue(&mut self, record: MutationRecord) {
        let recipients = self.recipients(record.target);
        for &removed in &record.removed {
            for &id in &recipients {
                self.transient.push((id, removed));
            }
        }
        self.pending.push(Queued { record, recipients });
    }

    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.node_mut(node)?.parent.take()?;
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        Some(parent)
    }
}

/// Reference host tree held entirely in memory.
pub struct MemoryTree {
    state: RefCell<TreeState>,
}

impl MemoryTree {
    /// Create a tree with an empty `body` root.
    #[must_use]
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = AHashMap::new();
        nodes.insert(root, NodeData::new("body"));
        Self {
            state: RefCell::new(TreeState {
                nodes,
                root,
                next_node: 2,
                next_listener: 1,
                next_observer: 1,
                observers: Vec::new(),
                transient: Vec::new(),
                pending: Vec::new(),
                writes: 0,
            }),
        }
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        let id = NodeId(state.next_node);
        state.next_node += 1;
        state.nodes.insert(id, NodeData::new(tag));
        id
    }

    /// Create a detached element with attributes.
    pub fn element(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag);
        for (name, value) in attributes {
            self.write_attribute(id, name, value);
        }
        id
    }

    /// Append `child` to `parent`, moving it if already attached.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.borrow_mut();
        if !state.nodes.contains_key(&parent) || !state.nodes.contains_key(&child) {
            return;
        }
        if let Some(old_parent) = state.detach(child) {
            state.queue(MutationRecord {
                target: old_parent,
                added: Vec::new(),
                removed: vec![child],
            });
        }
        if let Some(c) = state.node_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = state.node_mut(parent) {
            p.children.push(child);
        }
        state.queue(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
    }

    /// Detach `node` from its parent. The detached subtree keeps its
    /// internal links and listeners.
    pub fn remove(&self, node: NodeId) {
        let mut state = self.state.borrow_mut();
        if let Some(parent) = state.detach(node) {
            state.queue(MutationRecord {
                target: parent,
                added: Vec::new(),
                removed: vec![node],
            });
        }
    }

    /// Deliver queued structural changes to observers. Returns the number of
    /// records in the round.
    pub fn flush(&self) -> usize {
        let (records, observers) = {
            let mut state = self.state.borrow_mut();
            let records = std::mem::take(&mut state.pending);
            state.transient.clear();
            let observers: Vec<(ObserverId, MutationCallback)> = state
                .observers
                .iter()
                .map(|(id, _, cb)| (*id, MutationCallback::clone(cb)))
                .collect();
            (records, observers)
        };
        if records.is_empty() {
            return 0;
        }
        for (id, callback) in observers {
            let still_observing = self
                .state
                .borrow()
                .observers
                .iter()
                .any(|(oid, _, _)| *oid == id);
            if !still_observing {
                continue;
            }
            let batch: Vec<MutationRecord> = records
                .iter()
                .filter(|queued| queued.recipients.contains(&id))
                .map(|queued| queued.record.clone())
                .collect();
            if !batch.is_empty() {
                callback(&batch);
            }
        }
        records.len()
    }

    /// Queued, undelivered structural changes.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Count of content/attribute/control writes performed through the host
    /// interface.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.borrow().writes
    }

    #[must_use]
    pub fn listener_count(&self, node: NodeId) -> usize {
        self.state
            .borrow()
            .node(node)
            .map_or(0, |n| n.listeners.len())
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Simulate typing: set the control value, then fire `input`.
    pub fn input(&self, node: NodeId, value: &str) {
        self.set_value(node, value);
        self.dispatch(&HostEvent::new("input", node).bubbling(true));
    }

    /// Simulate editing a contenteditable node, then fire `input`.
    pub fn edit_text(&self, node: NodeId, text: &str) {
        self.set_text_content(node, text);
        self.dispatch(&HostEvent::new("input", node).bubbling(true));
    }

    /// Simulate clicking a checkbox or radio, then fire `change`.
    ///
    /// Checkboxes flip. Radios become checked and uncheck the other radios
    /// sharing their `name` under the same parent.
    pub fn toggle(&self, node: NodeId) {
        let is_radio = self
            .attribute(node, "type")
            .is_some_and(|t| t.eq_ignore_ascii_case("radio"));
        if is_radio {
            if let (Some(parent), Some(name)) = (self.parent(node), self.attribute(node, "name")) {
                for sibling in self.children(parent) {
                    let same_group =
                        self.attribute(sibling, "name").as_deref() == Some(name.as_str());
                    if sibling != node && same_group {
                        self.set_checked(sibling, false);
                    }
                }
            }
            self.set_checked(node, true);
        } else {
            let checked = self.checked(node);
            self.set_checked(node, !checked);
        }
        self.dispatch(&HostEvent::new("change", node).bubbling(true));
    }

    /// Simulate picking an option in a select, then fire `change`.
    pub fn choose(&self, node: NodeId, value: &str) {
        self.set_value(node, value);
        self.dispatch(&HostEvent::new("change", node).bubbling(true));
    }

    /// Fire a bubbling, cancelable `click`. Returns `false` if prevented.
    pub fn click(&self, node: NodeId) -> bool {
        self.dispatch(&HostEvent::new("click", node).bubbling(true).cancelable(true))
    }

    fn touch(&self) {
        self.state.borrow_mut().writes += 1;
    }

    fn write_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        let Some(n) = state.node_mut(node) else {
            return;
        };
        match name {
            "value" => n.value = value.to_owned(),
            "checked" => n.checked = true,
            _ => {}
        }
        n.attributes.insert(name.to_owned(), value.to_owned());
    }

    fn styles(&self, node: NodeId) -> IndexMap<String, String> {
        parse_style(&self.attribute(node, "style").unwrap_or_default())
    }

    fn write_styles(&self, node: NodeId, styles: &IndexMap<String, String>) {
        if styles.is_empty() {
            self.remove_attribute(node, "style");
        } else {
            self.set_attribute(node, "style", &format_style(styles));
        }
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTree for MemoryTree {
    fn root(&self) -> NodeId {
        self.state.borrow().root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().node(node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let root = self.root();
        self.is_inclusive_descendant(node, root)
    }

    fn query_all(&self, scope: NodeId, attribute: &str) -> Vec<NodeId> {
        let state = self.state.borrow();
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = state
            .node(scope)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            let Some(node) = state.node(id) else {
                continue;
            };
            if node.attributes.contains_key(attribute) {
                found.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    fn by_id(&self, id: &str) -> Option<NodeId> {
        let root = self.root();
        self.query_all(root, "id")
            .into_iter()
            .find(|n| self.attribute(*n, "id").as_deref() == Some(id))
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .borrow()
            .node(node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.write_attribute(node, name, value);
        self.touch();
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.attributes.shift_remove(name);
        }
        self.touch();
    }

    fn text_content(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    fn set_text_content(&self, node: NodeId, text: &str) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.text = text.to_owned();
            n.html = None;
        }
        self.touch();
    }

    fn inner_html(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.html.clone().unwrap_or_else(|| escape_html(&n.text)))
            .unwrap_or_default()
    }

    fn set_inner_html(&self, node: NodeId, html: &str) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.text = strip_tags(html);
            n.html = Some(html.to_owned());
        }
        self.touch();
    }

    fn class_list(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    fn toggle_class(&self, node: NodeId, class: &str, on: bool) {
        let mut classes = self.class_list(node);
        let present = classes.iter().any(|c| c == class);
        match (present, on) {
            (false, true) => classes.push(class.to_owned()),
            (true, false) => classes.retain(|c| c != class),
            _ => return,
        }
        self.set_attribute(node, "class", &classes.join(" "));
    }

    fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        self.styles(node).get(property).cloned()
    }

    fn set_style_property(&self, node: NodeId, property: &str, value: &str) {
        let mut styles = self.styles(node);
        styles.insert(property.trim().to_owned(), value.trim().to_owned());
        self.write_styles(node, &styles);
    }

    fn remove_style_property(&self, node: NodeId, property: &str) {
        let mut styles = self.styles(node);
        if styles.shift_remove(property.trim()).is_some() {
            self.write_styles(node, &styles);
        }
    }

    fn replace_style(&self, node: NodeId, css: &str) {
        let styles = parse_style(css);
        self.write_styles(node, &styles);
    }

    fn value(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.value.clone())
            .unwrap_or_default()
    }

    fn set_value(&self, node: NodeId, value: &str) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.value = value.to_owned();
        }
        self.touch();
    }

    fn checked(&self, node: NodeId) -> bool {
        self.state.borrow().node(node).is_some_and(|n| n.checked)
    }

    fn set_checked(&self, node: NodeId, checked: bool) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.checked = checked;
        }
        self.touch();
    }

    fn listen(&self, node: NodeId, event: &str, listener: Listener) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        if let Some(n) = state.node_mut(node) {
            n.listeners.push((id, event.to_owned(), listener));
        }
        id
    }

    fn unlisten(&self, node: NodeId, listener: ListenerId) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.listeners.retain(|(id, _, _)| *id != listener);
        }
    }

    fn dispatch(&self, event: &HostEvent) -> bool {
        let mut cursor = Some(event.target());
        while let Some(node) = cursor {
            let listeners: Vec<Listener> = self
                .state
                .borrow()
                .node(node)
                .map(|n| {
                    n.listeners
                        .iter()
                        .filter(|(_, name, _)| name == event.name())
                        .map(|(_, _, l)| Listener::clone(l))
                        .collect()
                })
                .unwrap_or_default();
            for listener in listeners {
                listener(event);
            }
            if !event.bubbles() || event.propagation_stopped() {
                break;
            }
            cursor = self.parent(node);
        }
        !event.default_prevented()
    }

    fn observe(&self, root: NodeId, callback: MutationCallback) -> ObserverId {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.push((id, root, callback));
        id
    }

    fn disconnect(&self, observer: ObserverId) {
        let mut state = self.state.borrow_mut();
        state.observers.retain(|(id, _, _)| *id != observer);
        state.transient.retain(|(id, _)| *id != observer);
    }
}

fn parse_style(css: &str) -> IndexMap<String, String> {
    css.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            (!prop.is_empty()).then(|| (prop.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

fn format_style(styles: &IndexMap<String, String>) -> String {
    styles
        .iter()
        .map(|(k, v)| format!("{k}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}
