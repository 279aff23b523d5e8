#![forbid(unsafe_code)]

//! Controller definitions: the class-level description of a controller.

use std::fmt;
use std::rc::Rc;

use bindery_core::{BinderyError, HostEvent, Map, Result, Value};
use indexmap::IndexMap;

use super::Instance;

/// A named method. Invoked with the triggering event for declarative event
/// wiring, or with `None` when used as a zero-argument accessor by a binding.
pub type Method = Rc<dyn Fn(&Instance, Option<&HostEvent>) -> Value>;

/// A computed derivation, evaluated with the instance as receiver.
pub type Derivation = Rc<dyn Fn(&Instance) -> Value>;

/// Lifecycle hook (`connect` / `disconnect`).
pub type Hook = Rc<dyn Fn(&Instance)>;

/// Class-level controller description, built fluently.
///
/// ```ignore
/// let def = ControllerDef::new("counter")
///     .state("count", 0)
///     .config("step", 1)
///     .computed("label", |c| format!("Count: {}", c.get("count")).into())
///     .method("increment", |c, _| {
///         let step = c.get("step").as_f64().unwrap_or(1.0);
///         let _ = c.set("count", c.get("count").as_f64().unwrap_or(0.0) + step);
///         Value::Null
///     });
/// ```
#[derive(Clone, Default)]
pub struct ControllerDef {
    pub(crate) name: String,
    pub(crate) state: Map,
    pub(crate) config: Map,
    pub(crate) computed: IndexMap<String, Derivation>,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) on_connect: Option<Hook>,
    pub(crate) on_disconnect: Option<Hook>,
}

impl ControllerDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default state entry.
    #[must_use]
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Default config entry.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn computed(
        mut self,
        key: impl Into<String>,
        derive: impl Fn(&Instance) -> Value + 'static,
    ) -> Self {
        self.computed.insert(key.into(), Rc::new(derive));
        self
    }

    #[must_use]
    pub fn method(
        mut self,
        key: impl Into<String>,
        method: impl Fn(&Instance, Option<&HostEvent>) -> Value + 'static,
    ) -> Self {
        self.methods.insert(key.into(), Rc::new(method));
        self
    }

    #[must_use]
    pub fn on_connect(mut self, hook: impl Fn(&Instance) + 'static) -> Self {
        self.on_connect = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_disconnect(mut self, hook: impl Fn(&Instance) + 'static) -> Self {
        self.on_disconnect = Some(Rc::new(hook));
        self
    }

    /// Check the structural contract: a non-blank name and non-empty keys
    /// without path separators.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BinderyError::invalid_definition(
                &self.name,
                "name must not be blank",
            ));
        }
        let keys = self
            .state
            .keys()
            .chain(self.config.keys())
            .chain(self.computed.keys())
            .chain(self.methods.keys());
        for key in keys {
            if key.is_empty() {
                return Err(BinderyError::invalid_definition(
                    &self.name,
                    "keys must not be empty",
                ));
            }
            if key.contains('.') {
                return Err(BinderyError::invalid_definition(
                    &self.name,
                    format!("key `{key}` must not contain `.`"),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ControllerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDef")
            .field("name", &self.name)
            .field("state", &self.state.keys().collect::<Vec<_>>())
            .field("config", &self.config.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-instance overrides, already parsed.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub state: Map,
    pub config: Map,
}

impl Overrides {
    #[must_use]
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Defaults overridden by instance data; override-only keys are kept.
/// Nested objects are copied so instances never share them.
pub(crate) fn merge(defaults: &Map, overrides: &Map) -> Map {
    let mut merged: Map = defaults
        .iter()
        .map(|(key, value)| (key.clone(), value.deep_clone()))
        .collect();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.deep_clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_names_and_bad_keys() {
        assert!(ControllerDef::new("  ").validate().is_err());
        assert!(ControllerDef::new("x").state("", 1).validate().is_err());
        let err = ControllerDef::new("x")
            .config("a.b", 1)
            .validate()
            .expect_err("dotted key");
        assert!(err.is_fatal());
        assert!(ControllerDef::new("x").state("a", 1).validate().is_ok());
    }

    #[test]
    fn merge_overrides_defaults_and_keeps_extras() {
        let defaults: Map = [("a".to_owned(), Value::from(1)), ("b".to_owned(), Value::from(2))]
            .into_iter()
            .collect();
        let overrides: Map = [("b".to_owned(), Value::from(20)), ("c".to_owned(), Value::from(3))]
            .into_iter()
            .collect();
        let merged = merge(&defaults, &overrides);
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(merged["b"], Value::from(20));
    }

    #[test]
    fn merge_copies_nested_objects() {
        let nested = bindery_core::Object::new();
        let defaults: Map = [("n".to_owned(), Value::Object(nested.clone()))]
            .into_iter()
            .collect();
        let merged = merge(&defaults, &Map::new());
        let copy = merged["n"].as_object().cloned().expect("object");
        assert!(!copy.ptr_eq(&nested));
    }

    #[test]
    fn debug_lists_keys_only() {
        let def = ControllerDef::new("demo")
            .state("s", 1)
            .method("m", |_, _| Value::Null);
        let dbg = format!("{def:?}");
        assert!(dbg.contains("demo"));
        assert!(dbg.contains("\"m\""));
    }
}
