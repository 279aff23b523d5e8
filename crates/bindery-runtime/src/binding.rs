#![forbid(unsafe_code)]

//! Binding engine: declarative bindings between instance state and nodes.
//!
//! Every declaration becomes one effect that resolves its path on the
//! instance and applies the result to the node through the update policy
//! ([`apply`]). Two-way declarations on form controls also install one
//! listener that converts the control's current value and writes it back.
//!
//! # Update policy
//!
//! | kind | value | effect on the node |
//! |---|---|---|
//! | `text` | any | text content, if changed |
//! | `html` | any | markup content, if changed |
//! | `class` | object | toggle each (space separated) name by truthiness |
//! | `class` | string / null | replace the class attribute |
//! | `style` | object | set each property; `null`/`false` removes it |
//! | `style` | string / null | replace the inline style |
//! | `value` | any | checkbox: checked; radio: own value matches; else value |
//! | `checked` | any | checked = truthy |
//! | `show` | any | falsy sets `hidden`, truthy removes it |
//! | other | bool / null | `true` sets an empty attribute, `false`/`null` removes |
//! | other | any | stringified attribute |
//!
//! # Invariants
//!
//! 1. Each binding's disposer and each listener's removal is registered
//!    under the bound node.
//! 2. A two-way binding installs exactly one listener, on `input` for free
//!    text and `change` for checkboxes, radios and selects.
//! 3. Writes are skipped when the node already shows the value, so the
//!    echo of a write-back never touches the node.
//!
//! # Failure Modes
//!
//! - **Unsupported value for a kind**: [`apply`] returns an error, the
//!   binding logs it and keeps running.
//! - **Write-back rejected** (e.g. the path names a computed key): logged,
//!   never propagated into the event.

use std::rc::Rc;

use bindery_core::markup::parse_bindings;
use bindery_core::{
    BinderyError, BindingDecl, BindingKind, Direction, HostEvent, HostTree, NodeId, Result,
    Store, Value, run_effect,
};
use tracing::warn;

use crate::controller::Instance;
use crate::scope;

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// What kind of form control a node is, for two-way conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Checkbox,
    Radio,
    Select,
    /// `input[type=number]` and `input[type=range]`.
    Number,
    /// Other inputs and textareas.
    Text,
    /// `contenteditable` elements.
    Editable,
    /// Not a control.
    None,
}

impl ControlKind {
    /// Classify `node`.
    #[must_use]
    pub fn of(tree: &dyn HostTree, node: NodeId) -> Self {
        match tree.tag_name(node).as_str() {
            "input" => {
                let input_type = tree
                    .attribute(node, "type")
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                match input_type.as_str() {
                    "checkbox" => Self::Checkbox,
                    "radio" => Self::Radio,
                    "number" | "range" => Self::Number,
                    _ => Self::Text,
                }
            }
            "textarea" => Self::Text,
            "select" => Self::Select,
            _ => match tree.attribute(node, "contenteditable") {
                Some(flag) if !flag.eq_ignore_ascii_case("false") => Self::Editable,
                _ => Self::None,
            },
        }
    }

    /// The event a two-way binding listens to.
    #[must_use]
    pub fn trigger_event(self) -> Option<&'static str> {
        match self {
            Self::Checkbox | Self::Radio | Self::Select => Some("change"),
            Self::Number | Self::Text | Self::Editable => Some("input"),
            Self::None => None,
        }
    }

    /// Convert the control's current state into the value written back by
    /// a binding of `kind`.
    ///
    /// A `checked` binding always reads the checked state as a boolean.
    /// `None` means nothing should be written: an unchecked radio bound by
    /// value, or a node that is not a control.
    #[must_use]
    pub fn read(self, kind: &BindingKind, tree: &dyn HostTree, node: NodeId) -> Option<Value> {
        if *kind == BindingKind::Checked && self != Self::None {
            return Some(Value::Bool(tree.checked(node)));
        }
        match self {
            Self::Checkbox => Some(Value::Bool(tree.checked(node))),
            Self::Radio => tree.checked(node).then(|| Value::String(tree.value(node))),
            Self::Number => {
                let parsed = tree
                    .value(node)
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .unwrap_or(0.0);
                Some(Value::Number(parsed))
            }
            Self::Editable => Some(Value::String(tree.text_content(node))),
            Self::Text | Self::Select => Some(Value::String(tree.value(node))),
            Self::None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Update policy
// ---------------------------------------------------------------------------

/// Apply `value` to `node` as a binding of `kind`.
pub fn apply(tree: &dyn HostTree, node: NodeId, kind: &BindingKind, value: &Value) -> Result<()> {
    match kind {
        BindingKind::Text => {
            let text = value.to_string();
            if tree.text_content(node) != text {
                tree.set_text_content(node, &text);
            }
        }
        BindingKind::Html => {
            let html = value.to_string();
            if tree.inner_html(node) != html {
                tree.set_inner_html(node, &html);
            }
        }
        BindingKind::Class => apply_class(tree, node, value)?,
        BindingKind::Style => apply_style(tree, node, value)?,
        BindingKind::Value => match ControlKind::of(tree, node) {
            ControlKind::Checkbox => set_checked(tree, node, value.is_truthy()),
            ControlKind::Radio => {
                let own = tree.value(node);
                set_checked(tree, node, own == value.to_string());
            }
            _ => {
                let text = value.to_string();
                if tree.value(node) != text {
                    tree.set_value(node, &text);
                }
            }
        },
        BindingKind::Checked => set_checked(tree, node, value.is_truthy()),
        BindingKind::Show => {
            let hidden = tree.attribute(node, "hidden").is_some();
            if value.is_truthy() && hidden {
                tree.remove_attribute(node, "hidden");
            } else if !value.is_truthy() && !hidden {
                tree.set_attribute(node, "hidden", "");
            }
        }
        BindingKind::Attribute(name) => match value {
            Value::Bool(false) | Value::Null => {
                if tree.attribute(node, name).is_some() {
                    tree.remove_attribute(node, name);
                }
            }
            Value::Bool(true) => set_attribute(tree, node, name, ""),
            other => set_attribute(tree, node, name, &other.to_string()),
        },
    }
    Ok(())
}

fn set_checked(tree: &dyn HostTree, node: NodeId, checked: bool) {
    if tree.checked(node) != checked {
        tree.set_checked(node, checked);
    }
}

fn set_attribute(tree: &dyn HostTree, node: NodeId, name: &str, value: &str) {
    if tree.attribute(node, name).as_deref() != Some(value) {
        tree.set_attribute(node, name, value);
    }
}

fn apply_class(tree: &dyn HostTree, node: NodeId, value: &Value) -> Result<()> {
    match value {
        Value::Object(classes) => {
            // Read through a store so nested toggles are tracked.
            let classes = Store::wrap(classes);
            for key in classes.keys() {
                let on = classes.get(&key).is_truthy();
                for name in key.split_whitespace() {
                    tree.toggle_class(node, name, on);
                }
            }
        }
        Value::String(names) => set_attribute(tree, node, "class", names),
        Value::Null => set_attribute(tree, node, "class", ""),
        other => {
            return Err(BinderyError::apply(
                "class",
                format!("expected an object or string, found {}", other.type_name()),
            ));
        }
    }
    Ok(())
}

fn apply_style(tree: &dyn HostTree, node: NodeId, value: &Value) -> Result<()> {
    match value {
        Value::Object(properties) => {
            let properties = Store::wrap(properties);
            for property in properties.keys() {
                match properties.get(&property) {
                    Value::Null | Value::Bool(false) => tree.remove_style_property(node, &property),
                    v => {
                        let v = v.to_string();
                        if tree.style_property(node, &property).as_deref() != Some(v.as_str()) {
                            tree.set_style_property(node, &property, &v);
                        }
                    }
                }
            }
        }
        Value::String(css) => tree.replace_style(node, css),
        Value::Null => tree.replace_style(node, ""),
        other => {
            return Err(BinderyError::apply(
                "style",
                format!("expected an object or string, found {}", other.type_name()),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Install every binding declared on `scope` and its owned descendants.
/// Returns the number of declarations installed.
///
/// Callers tear down existing bindings under `scope` first.
pub(crate) fn bind(instance: &Instance, scope: NodeId) -> usize {
    let tree = instance.tree();
    let mut installed = 0;
    for (attr, direction) in instance.markup().binding_attributes() {
        for node in scope::scoped_nodes(instance, scope, attr) {
            let Some(raw) = tree.attribute(node, attr) else {
                continue;
            };
            for decl in parse_bindings(&raw, direction) {
                install(instance, node, decl);
                installed += 1;
            }
        }
    }
    installed
}

fn install(instance: &Instance, node: NodeId, decl: BindingDecl) {
    let BindingDecl {
        kind,
        path,
        direction,
    } = decl;

    if direction == Direction::TwoWay {
        let control = ControlKind::of(&*instance.tree(), node);
        match control.trigger_event() {
            Some(event) if kind.is_two_way_capable() => {
                listen(instance, node, event, control, kind.clone(), path.clone());
            }
            _ => warn!(
                message = "binding.not_a_control",
                controller = %instance.name(),
                node = %node,
                kind = kind.as_str(),
                key = %path
            ),
        }
    }

    let weak = instance.downgrade();
    let effect = run_effect(move || {
        let Some(instance) = weak.upgrade() else {
            return;
        };
        let value = instance.get(&path);
        if let Err(err) = apply(&*instance.tree(), node, &kind, &value) {
            warn!(
                message = "binding.apply_failed",
                controller = %instance.name(),
                node = %node,
                key = %path,
                error = %err
            );
        }
    });
    instance.add_cleanup(node, Box::new(move || effect.dispose()));
}

fn listen(
    instance: &Instance,
    node: NodeId,
    event: &str,
    control: ControlKind,
    kind: BindingKind,
    path: String,
) {
    let tree = instance.tree();
    let weak = instance.downgrade();
    let listener = tree.listen(
        node,
        event,
        Rc::new(move |_: &HostEvent| {
            let Some(instance) = weak.upgrade() else {
                return;
            };
            let Some(value) = control.read(&kind, &*instance.tree(), node) else {
                return;
            };
            if let Err(err) = instance.set(&path, value) {
                warn!(
                    message = "binding.write_back_failed",
                    controller = %instance.name(),
                    node = %node,
                    key = %path,
                    error = %err
                );
            }
        }),
    );
    instance.add_cleanup(node, Box::new(move || tree.unlisten(node, listener)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_core::{MemoryTree, Object};

    fn node(tree: &MemoryTree, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = tree.element(tag, attrs);
        tree.append_child(tree.root(), id);
        id
    }

    #[test]
    fn control_kinds_and_triggers() {
        let tree = MemoryTree::new();
        let cases = [
            ("input", vec![("type", "checkbox")], ControlKind::Checkbox, Some("change")),
            ("input", vec![("type", "RADIO")], ControlKind::Radio, Some("change")),
            ("input", vec![("type", "range")], ControlKind::Number, Some("input")),
            ("input", vec![], ControlKind::Text, Some("input")),
            ("textarea", vec![], ControlKind::Text, Some("input")),
            ("select", vec![], ControlKind::Select, Some("change")),
            ("div", vec![("contenteditable", "")], ControlKind::Editable, Some("input")),
            ("div", vec![("contenteditable", "false")], ControlKind::None, None),
            ("span", vec![], ControlKind::None, None),
        ];
        for (tag, attrs, kind, trigger) in cases {
            let id = node(&tree, tag, &attrs);
            assert_eq!(ControlKind::of(&tree, id), kind, "{tag} {attrs:?}");
            assert_eq!(kind.trigger_event(), trigger);
        }
    }

    #[test]
    fn number_controls_read_zero_on_parse_failure() {
        let tree = MemoryTree::new();
        let id = node(&tree, "input", &[("type", "number")]);
        tree.set_value(id, "12.5");
        let kind = BindingKind::Value;
        assert_eq!(ControlKind::Number.read(&kind, &tree, id), Some(Value::from(12.5)));
        tree.set_value(id, "abc");
        assert_eq!(ControlKind::Number.read(&kind, &tree, id), Some(Value::from(0)));
    }

    #[test]
    fn unchecked_radio_reads_nothing() {
        let tree = MemoryTree::new();
        let id = node(&tree, "input", &[("type", "radio"), ("value", "b")]);
        assert_eq!(ControlKind::Radio.read(&BindingKind::Value, &tree, id), None);
        tree.set_checked(id, true);
        assert_eq!(
            ControlKind::Radio.read(&BindingKind::Value, &tree, id),
            Some(Value::from("b"))
        );
    }

    #[test]
    fn checked_bindings_read_booleans() {
        let tree = MemoryTree::new();
        let radio = node(&tree, "input", &[("type", "radio"), ("value", "b")]);
        let checked = BindingKind::Checked;
        assert_eq!(
            ControlKind::Radio.read(&checked, &tree, radio),
            Some(Value::Bool(false))
        );
        tree.set_checked(radio, true);
        assert_eq!(
            ControlKind::Radio.read(&checked, &tree, radio),
            Some(Value::Bool(true))
        );
        let span = node(&tree, "span", &[]);
        assert_eq!(ControlKind::None.read(&checked, &tree, span), None);
    }

    #[test]
    fn text_writes_only_when_changed() {
        let tree = MemoryTree::new();
        let id = node(&tree, "span", &[]);
        apply(&tree, id, &BindingKind::Text, &Value::from(3)).expect("text");
        let writes = tree.write_count();
        apply(&tree, id, &BindingKind::Text, &Value::from("3")).expect("text");
        assert_eq!(tree.text_content(id), "3");
        assert_eq!(tree.write_count(), writes);
    }

    #[test]
    fn class_object_toggles_names() {
        let tree = MemoryTree::new();
        let id = node(&tree, "div", &[("class", "base")]);
        let classes: Object = [
            ("active".to_owned(), Value::from(true)),
            ("big bold".to_owned(), Value::from(1)),
            ("base".to_owned(), Value::from(false)),
        ]
        .into_iter()
        .collect();
        apply(&tree, id, &BindingKind::Class, &Value::Object(classes)).expect("class");
        assert_eq!(tree.class_list(id), vec!["active", "big", "bold"]);

        apply(&tree, id, &BindingKind::Class, &Value::from("x y")).expect("class");
        assert_eq!(tree.class_list(id), vec!["x", "y"]);
    }

    #[test]
    fn class_list_value_is_rejected() {
        let tree = MemoryTree::new();
        let id = node(&tree, "div", &[]);
        let err = apply(&tree, id, &BindingKind::Class, &Value::List(vec![Value::from("a")]))
            .expect_err("lists are not a class form");
        assert!(matches!(err, BinderyError::Apply { .. }));
    }

    #[test]
    fn style_object_sets_and_removes_properties() {
        let tree = MemoryTree::new();
        let id = node(&tree, "div", &[("style", "color: red; margin: 0")]);
        let style: Object = [
            ("color".to_owned(), Value::from("blue")),
            ("margin".to_owned(), Value::Null),
            ("width".to_owned(), Value::from("10px")),
        ]
        .into_iter()
        .collect();
        apply(&tree, id, &BindingKind::Style, &Value::Object(style)).expect("style");
        assert_eq!(tree.style_property(id, "color").as_deref(), Some("blue"));
        assert_eq!(tree.style_property(id, "margin"), None);
        assert_eq!(tree.style_property(id, "width").as_deref(), Some("10px"));

        apply(&tree, id, &BindingKind::Style, &Value::from("display: none")).expect("style");
        assert_eq!(tree.style_property(id, "display").as_deref(), Some("none"));
        assert_eq!(tree.style_property(id, "color"), None);
    }

    #[test]
    fn value_kind_follows_control_type() {
        let tree = MemoryTree::new();
        let checkbox = node(&tree, "input", &[("type", "checkbox")]);
        apply(&tree, checkbox, &BindingKind::Value, &Value::from("yes")).expect("value");
        assert!(tree.checked(checkbox));

        let radio = node(&tree, "input", &[("type", "radio"), ("value", "a")]);
        apply(&tree, radio, &BindingKind::Value, &Value::from("a")).expect("value");
        assert!(tree.checked(radio));
        apply(&tree, radio, &BindingKind::Value, &Value::from("b")).expect("value");
        assert!(!tree.checked(radio));

        let field = node(&tree, "input", &[]);
        apply(&tree, field, &BindingKind::Value, &Value::from(7)).expect("value");
        assert_eq!(tree.value(field), "7");
    }

    #[test]
    fn show_and_attributes() {
        let tree = MemoryTree::new();
        let id = node(&tree, "button", &[]);
        apply(&tree, id, &BindingKind::Show, &Value::from(false)).expect("show");
        assert_eq!(tree.attribute(id, "hidden").as_deref(), Some(""));
        apply(&tree, id, &BindingKind::Show, &Value::from("visible")).expect("show");
        assert_eq!(tree.attribute(id, "hidden"), None);

        let disabled = BindingKind::parse("disabled");
        apply(&tree, id, &disabled, &Value::from(true)).expect("attr");
        assert_eq!(tree.attribute(id, "disabled").as_deref(), Some(""));
        apply(&tree, id, &disabled, &Value::Null).expect("attr");
        assert_eq!(tree.attribute(id, "disabled"), None);

        let title = BindingKind::parse("title");
        apply(&tree, id, &title, &Value::from(42)).expect("attr");
        assert_eq!(tree.attribute(id, "title").as_deref(), Some("42"));
    }
}
