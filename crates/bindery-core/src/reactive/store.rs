#![forbid(unsafe_code)]

//! Reactive store: tracked reads and notifying writes over an [`Object`].
//!
//! # Invariants
//!
//! 1. `Store::wrap(&obj) == Store::wrap(&obj)` for the same object; the
//!    subscriber table lives on the object, so there is no separate wrapper
//!    cache to keep in sync or to leak.
//! 2. Nested objects get their subscriber table on first wrap, not when the
//!    parent is constructed.
//! 3. A write notifies only when the new value differs from the old one.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use super::effect::SubscriberSet;
use crate::error::{BinderyError, Result};
use crate::value::{Map, Object, Value};

/// Per-object map from key to the effects reading it.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    sets: RefCell<AHashMap<String, Rc<SubscriberSet>>>,
}

impl SubscriberTable {
    fn set_for(&self, key: &str) -> Rc<SubscriberSet> {
        let mut sets = self.sets.borrow_mut();
        if let Some(set) = sets.get(key) {
            return Rc::clone(set);
        }
        let set = Rc::new(SubscriberSet::default());
        sets.insert(key.to_owned(), Rc::clone(&set));
        set
    }

    fn existing(&self, key: &str) -> Option<Rc<SubscriberSet>> {
        self.sets.borrow().get(key).cloned()
    }
}

/// Reactive handle over one [`Object`].
///
/// Cloning a `Store` creates another handle to the **same** object. Equality
/// is object identity.
#[derive(Clone, PartialEq)]
pub struct Store {
    object: Object,
}

impl Store {
    /// Wrap an existing object. Idempotent: wrapping the same object twice
    /// yields equal stores sharing one subscriber table.
    #[must_use]
    pub fn wrap(object: &Object) -> Self {
        let _ = object.subscribers();
        Self {
            object: object.clone(),
        }
    }

    /// Wrap a fresh object built from `map`.
    #[must_use]
    pub fn new(map: Map) -> Self {
        Self::wrap(&Object::from_map(map))
    }

    /// The underlying object (raw access, no tracking).
    #[must_use]
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Tracked read. Absent keys read as `Null`, and the read is still
    /// tracked so a later insertion notifies.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        if super::is_tracking() {
            self.object.subscribers().set_for(key).track();
        }
        self.object.get(key).unwrap_or_default()
    }

    /// Tracked read returning a nested object as its own store.
    #[must_use]
    pub fn nested(&self, key: &str) -> Option<Store> {
        match self.get(key) {
            Value::Object(obj) => Some(Store::wrap(&obj)),
            _ => None,
        }
    }

    /// Tracked read through a dotted path (`"user.address.city"`). Every
    /// segment along the way is tracked; a non-object segment yields `Null`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        let mut value = self.get(first);
        for segment in segments {
            value = match value {
                Value::Object(obj) => Store::wrap(&obj).get(segment),
                _ => return Value::Null,
            };
        }
        value
    }

    /// Untracked read.
    #[must_use]
    pub fn peek(&self, key: &str) -> Value {
        self.object.get(key).unwrap_or_default()
    }

    /// Write `value`; if it differs from the current value, run every effect
    /// subscribed to `key`. Returns whether subscribers were notified.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let old = self.object.insert(key, value.clone()).unwrap_or_default();
        if old == value {
            return false;
        }
        if let Some(set) = self.object.subscribers().existing(key) {
            set.notify();
        }
        true
    }

    /// Write through a dotted path. Intermediate segments are read untracked
    /// and must hold objects.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let (parents, last) = match path.rsplit_once('.') {
            Some((parents, last)) => (Some(parents), last),
            None => (None, path),
        };
        let mut target = self.clone();
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                target = match target.peek(segment) {
                    Value::Object(obj) => Store::wrap(&obj),
                    _ => {
                        return Err(BinderyError::NotAnObject {
                            path: path.to_owned(),
                            segment: segment.to_owned(),
                        });
                    }
                };
            }
        }
        Ok(target.set(last, value))
    }

    /// Read-modify-write. The read is untracked.
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.peek(key));
        self.set(key, next)
    }

    /// Keys in insertion order (untracked).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.object.keys()
    }

    /// Number of effects currently depending on `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.object
            .subscribers()
            .existing(key)
            .map_or(0, |set| set.len())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Store").field(&self.object).finish()
    }
}
