#![forbid(unsafe_code)]

//! Derived cache: eagerly maintained computed values.
//!
//! # Design
//!
//! [`DerivedCache`] owns a private [`Store`]. Each [`define`](DerivedCache::define)
//! call starts one effect that evaluates the derivation and writes the result
//! into the store slot for that key. Reads return the slot; they never
//! evaluate the derivation.
//!
//! # Invariants
//!
//! 1. `get(key)` returns the value produced by the latest run of the key's
//!    effect.
//! 2. The derivation runs once at definition and once per change of any key
//!    it read during its previous run.
//! 3. An unchanged result does not notify readers of the slot.
//! 4. Slots are read through the store, so effects reading a computed key
//!    re-run when it changes.
//!
//! # Failure Modes
//!
//! - **Derivation panics**: the slot keeps its previous value; dependencies
//!   read before the panic stay registered, so the next change retries.

use std::cell::RefCell;
use std::fmt;

use super::effect::{EffectHandle, run_effect};
use super::store::Store;
use crate::value::{Map, Value};

/// Store of computed values, each kept current by one effect.
pub struct DerivedCache {
    store: Store,
    effects: RefCell<Vec<(String, EffectHandle)>>,
}

impl DerivedCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Store::new(Map::new()),
            effects: RefCell::new(Vec::new()),
        }
    }

    /// Define `key` as the result of `derive`, evaluated now and on every
    /// change of what it reads.
    pub fn define(&self, key: &str, derive: impl Fn() -> Value + 'static) -> EffectHandle {
        let slot = self.store.clone();
        let name = key.to_owned();
        let handle = run_effect(move || {
            let value = derive();
            slot.set(&name, value);
        });
        self.effects
            .borrow_mut()
            .push((key.to_owned(), handle.clone()));
        handle
    }

    /// Tracked read of a cached value.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.store.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.effects.borrow().iter().any(|(k, _)| k == key)
    }

    /// Defined keys in definition order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.effects.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// The effect maintaining `key`.
    #[must_use]
    pub fn effect(&self, key: &str) -> Option<EffectHandle> {
        self.effects
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, h)| h.clone())
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Stop every derivation. Slots keep their last values.
    pub fn dispose_all(&self) {
        for (_, handle) in self.effects.borrow().iter() {
            handle.dispose();
        }
    }
}

// Derivations reading other slots are subscribed to this cache's own store,
// which their closures also hold.
impl Drop for DerivedCache {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

impl Default for DerivedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DerivedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedCache")
            .field("keys", &self.keys())
            .field("values", self.store.object())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn source(pairs: &[(&str, f64)]) -> Store {
        let store = Store::new(Map::new());
        for (k, v) in pairs {
            store.set(k, *v);
        }
        store
    }

    fn num(store: &Store, key: &str) -> f64 {
        store.get(key).as_f64().unwrap_or(0.0)
    }

    #[test]
    fn single_dep_derived() {
        let src = source(&[("n", 10.0)]);
        let cache = DerivedCache::new();
        let s = src.clone();
        cache.define("double", move || Value::from(num(&s, "n") * 2.0));

        assert_eq!(cache.get("double"), Value::from(20));
        src.set("n", 5);
        assert_eq!(cache.get("double"), Value::from(10));
    }

    #[test]
    fn multi_dep_derived() {
        let src = source(&[("w", 10.0), ("h", 20.0)]);
        let cache = DerivedCache::new();
        let s = src.clone();
        cache.define("area", move || Value::from(num(&s, "w") * num(&s, "h")));

        assert_eq!(cache.get("area"), Value::from(200));
        src.set("w", 5);
        assert_eq!(cache.get("area"), Value::from(100));
        src.set("h", 30);
        assert_eq!(cache.get("area"), Value::from(150));
    }

    #[test]
    fn reads_never_recompute() {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let src = source(&[("n", 1.0)]);
        let cache = DerivedCache::new();
        let s = src.clone();
        cache.define("same", move || {
            c.set(c.get() + 1);
            s.get("n")
        });
        assert_eq!(count.get(), 1);
        for _ in 0..5 {
            let _ = cache.get("same");
        }
        assert_eq!(count.get(), 1);
        src.set("n", 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn unrelated_write_does_not_recompute() {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let src = source(&[("a", 1.0), ("b", 1.0)]);
        let cache = DerivedCache::new();
        let s = src.clone();
        cache.define("from_a", move || {
            c.set(c.get() + 1);
            s.get("a")
        });
        src.set("b", 2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn chained_derivations_propagate() {
        let src = source(&[("n", 2.0)]);
        let cache = Rc::new(DerivedCache::new());
        let s = src.clone();
        cache.define("square", move || Value::from(num(&s, "n") * num(&s, "n")));
        let c = Rc::clone(&cache);
        cache.define("label", move || Value::from(format!("sq={}", c.get("square"))));

        assert_eq!(cache.get("label"), Value::from("sq=4"));
        src.set("n", 3);
        assert_eq!(cache.get("label"), Value::from("sq=9"));
    }

    #[test]
    fn readers_of_a_slot_rerun_on_change() {
        let src = source(&[("n", 1.0)]);
        let cache = Rc::new(DerivedCache::new());
        let s = src.clone();
        cache.define("parity", move || {
            Value::from(if num(&s, "n") as i64 % 2 == 0 { "even" } else { "odd" })
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let c = Rc::clone(&cache);
        let reader = run_effect(move || sink.borrow_mut().push(c.get("parity")));

        src.set("n", 3);
        src.set("n", 4);
        assert_eq!(*seen.borrow(), vec![Value::from("odd"), Value::from("even")]);
        reader.dispose();
    }

    #[test]
    fn keys_and_effects_are_listed() {
        let cache = DerivedCache::new();
        cache.define("a", || Value::from(1));
        cache.define("b", || Value::from(2));
        assert_eq!(cache.keys(), vec!["a", "b"]);
        assert!(cache.contains("a"));
        assert!(!cache.contains("c"));
        assert_eq!(cache.effect("b").map(|h| h.run_count()), Some(1));
        let dbg = format!("{cache:?}");
        assert!(dbg.contains("DerivedCache"));
    }
}
