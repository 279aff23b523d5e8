#![forbid(unsafe_code)]

//! Dynamic values held by reactive stores and pushed into host nodes.
//!
//! [`Value`] is the single currency of the binding layer: state defaults,
//! per-instance overrides, computed results, event payloads, and control
//! read-backs are all `Value`s.
//!
//! # Equality
//!
//! Primitives and lists compare by value, with `NaN` equal to itself so that
//! rewriting a `NaN` is not a change. [`Object`] compares by identity:
//! two handles are equal only when they share the same underlying map. This
//! is what makes `store.set(k, store.get(k))` a no-op for nested objects and
//! keeps identity checks on wrapped sub-objects meaningful.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::store::SubscriberTable;

/// Ordered key/value map backing an [`Object`].
pub type Map = IndexMap<String, Value>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / null.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    /// Shared, interior-mutable object (identity semantics).
    Object(Object),
}

impl Value {
    /// Truthiness: `Null`, `false`, `0`, `NaN` and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::List(_) | Self::Object(_) => true,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short type label used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Copy with fresh [`Object`]s at every level. `clone` shares them.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::List(items) => Self::List(items.iter().map(Self::deep_clone).collect()),
            Self::Object(obj) => Self::Object(
                obj.entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.deep_clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Build a value from parsed JSON. JSON objects become fresh [`Object`]s.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(fields) => Self::Object(Object::from_map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            )),
        }
    }

    /// Snapshot as JSON. Integral numbers serialize without a fraction;
    /// non-finite numbers become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serde_json::Value::Number((*n as i64).into())
            }
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(obj) => serde_json::Value::Object(
                obj.entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

/// Stringification used when a value is written into the host tree.
///
/// `Null` renders as the empty string, integral numbers without a fraction,
/// lists and objects as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write_number(f, *n),
            Self::String(s) => f.write_str(s),
            Self::List(_) | Self::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Object(obj) => fmt::Debug::fmt(obj, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Self::Object(Object::from_map(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

struct ObjectInner {
    fields: RefCell<Map>,
    /// Per-key subscriber sets, allocated the first time the object is
    /// wrapped by a [`Store`](crate::reactive::Store).
    subscribers: OnceCell<SubscriberTable>,
}

/// Shared, interior-mutable ordered map.
///
/// Cloning an `Object` yields another handle to the **same** map. Writes
/// through `Object` itself are raw: they never notify subscribers. Go through
/// a [`Store`](crate::reactive::Store) for tracked reads and notifying writes.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::from_map(Map::new())
    }

    /// Create an object owning `map`.
    #[must_use]
    pub fn from_map(map: Map) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                fields: RefCell::new(map),
                subscribers: OnceCell::new(),
            }),
        }
    }

    /// Raw read (no tracking).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow().get(key).cloned()
    }

    /// Raw write (no notification). Returns the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner
            .fields
            .borrow_mut()
            .insert(key.into(), value.into())
    }

    /// Raw removal (no notification).
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow_mut().shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Snapshot of all entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    /// Whether both handles share the same underlying map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether a store has ever wrapped this object.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.inner.subscribers.get().is_some()
    }

    pub(crate) fn subscribers(&self) -> &SubscriberTable {
        self.inner.subscribers.get_or_init(SubscriberTable::default)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.fields.borrow().iter())
            .finish()
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_scripting_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::List(vec![]).is_truthy());
        assert!(Value::from(Object::new()).is_truthy());
    }

    #[test]
    fn display_renders_host_strings() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-0.0).to_string(), "0");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(
            Value::List(vec![Value::from(1), Value::from("a")]).to_string(),
            "[1,\"a\"]"
        );
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Object::new();
        a.insert("x", 1);
        let b = Object::new();
        b.insert("x", 1);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_ne!(Value::from(f64::NAN), Value::from(0.0));
        assert_eq!(
            Value::List(vec![Value::from(f64::NAN)]),
            Value::List(vec![Value::from(f64::NAN)])
        );
    }

    #[test]
    fn lists_compare_by_value() {
        let a = Value::List(vec![Value::from(1), Value::from("x")]);
        let b = Value::List(vec![Value::from(1), Value::from("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let json = serde_json::json!({"name": "Ada", "tags": ["a", "b"], "meta": {"n": 2}});
        let value = Value::from_json(json.clone());
        let obj = value.as_object().expect("object");
        assert_eq!(obj.keys(), vec!["name", "tags", "meta"]);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn object_writes_are_shared_between_handles() {
        let a = Object::new();
        let b = a.clone();
        a.insert("k", "v");
        assert_eq!(b.get("k"), Some(Value::from("v")));
        assert!(!a.is_reactive());
    }

    #[test]
    fn deep_clone_detaches_nested_objects() {
        let inner = Object::new();
        inner.insert("n", 1);
        let original = Value::List(vec![Value::Object(inner.clone())]);
        let copy = original.deep_clone();
        inner.insert("n", 2);
        let copied = copy.as_list().and_then(|l| l[0].as_object().cloned());
        assert_eq!(copied.and_then(|o| o.get("n")), Some(Value::from(1)));
    }
}
