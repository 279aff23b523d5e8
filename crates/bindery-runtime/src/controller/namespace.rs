#![forbid(unsafe_code)]

//! Flattened instance namespace.
//!
//! State, config, computed keys and methods share one namespace. They are
//! merged in that order in a single pass; the first definition of a key
//! wins and every later one is reported as a [`Collision`].

use std::fmt;

use bindery_core::Map;
use indexmap::IndexMap;

use super::def::ControllerDef;

/// What a namespace key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Reactive, writable.
    State,
    /// Plain, read-only.
    Config,
    /// Derived cache, read-only.
    Computed,
    /// Callable.
    Method,
}

impl Slot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Config => "config",
            Self::Computed => "computed",
            Self::Method => "method",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A later definition skipped because the key was already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub key: String,
    pub kept: Slot,
    pub skipped: Slot,
}

/// Key → slot map for one instance.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    slots: IndexMap<String, Slot>,
}

impl Namespace {
    /// Merge `state`, `config`, the definition's computed keys, then its
    /// methods.
    pub(crate) fn build(def: &ControllerDef, state: &Map, config: &Map) -> (Self, Vec<Collision>) {
        let mut ns = Self::default();
        let mut collisions = Vec::new();
        let groups = [
            (Slot::State, state.keys().collect::<Vec<_>>()),
            (Slot::Config, config.keys().collect()),
            (Slot::Computed, def.computed.keys().collect()),
            (Slot::Method, def.methods.keys().collect()),
        ];
        for (slot, keys) in groups {
            for key in keys {
                match ns.slots.get(key) {
                    Some(&kept) => collisions.push(Collision {
                        key: key.clone(),
                        kept,
                        skipped: slot,
                    }),
                    None => {
                        ns.slots.insert(key.clone(), slot);
                    }
                }
            }
        }
        (ns, collisions)
    }

    #[must_use]
    pub fn slot(&self, key: &str) -> Option<Slot> {
        self.slots.get(key).copied()
    }

    /// Keys bound to `slot`, in merge order.
    #[must_use]
    pub fn keys_of(&self, slot: Slot) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, s)| **s == slot)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
