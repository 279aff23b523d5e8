//! Property-based invariant tests for the reactive store and effects.
//!
//! 1. Writing the current value never runs an effect, including `NaN` and
//!    other non-finite numbers
//! 2. N distinct writes with M subscribers: each subscriber runs once per
//!    write, in subscription order
//! 3. Effects re-run only for keys they read on their latest run
//! 4. Disposed effects never run again
//! 5. Derived values always equal their derivation over the current store
//! 6. Dotted-path writes reach only the readers of that path

use std::cell::RefCell;
use std::rc::Rc;

use bindery_core::{DerivedCache, Map, Object, Store, Value, run_effect};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

const KEYS: [&str; 4] = ["a", "b", "c", "d"];

fn arb_key() -> impl Strategy<Value = &'static str> {
    prop::sample::select(KEYS.to_vec())
}

fn arb_number() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(-0.0),
        any::<f64>(),
    ]
}

fn store_with(values: &[i32]) -> Store {
    let store = Store::new(Map::new());
    for (key, v) in KEYS.iter().zip(values) {
        store.set(key, *v);
    }
    store
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Equal writes are silent
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn equal_writes_never_run_effects(
        initial in prop::collection::vec(-5i32..5, 4),
        key in arb_key(),
    ) {
        let store = store_with(&initial);
        let runs = Rc::new(RefCell::new(0u32));
        let (s, r) = (store.clone(), Rc::clone(&runs));
        let effect = run_effect(move || {
            for key in KEYS {
                let _ = s.get(key);
            }
            *r.borrow_mut() += 1;
        });
        let current = store.peek(key);
        prop_assert!(!store.set(key, current));
        prop_assert_eq!(*runs.borrow(), 1);
        effect.dispose();
    }

    #[test]
    fn equal_number_writes_never_run_effects(value in arb_number(), key in arb_key()) {
        let store = Store::new(Map::new());
        store.set(key, value);
        let runs = Rc::new(RefCell::new(0u32));
        let (s, r) = (store.clone(), Rc::clone(&runs));
        let effect = run_effect(move || {
            let _ = s.get(key);
            *r.borrow_mut() += 1;
        });
        prop_assert!(!store.set(key, store.peek(key)));
        prop_assert!(!store.set(key, value));
        prop_assert_eq!(*runs.borrow(), 1);
        effect.dispose();
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. N writes × M subscribers
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn each_subscriber_runs_once_per_write_in_order(
        subscribers in 1usize..6,
        writes in 1usize..12,
    ) {
        let store = store_with(&[0]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let effects: Vec<_> = (0..subscribers)
            .map(|id| {
                let (s, l) = (store.clone(), Rc::clone(&log));
                run_effect(move || {
                    let _ = s.get("a");
                    l.borrow_mut().push(id);
                })
            })
            .collect();
        log.borrow_mut().clear();

        for n in 1..=writes {
            prop_assert!(store.set("a", n));
        }

        let expected: Vec<usize> = (0..writes).flat_map(|_| 0..subscribers).collect();
        prop_assert_eq!(&*log.borrow(), &expected);
        prop_assert_eq!(store.subscriber_count("a"), subscribers);
        for effect in &effects {
            prop_assert_eq!(effect.run_count(), 1 + writes as u64);
            effect.dispose();
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Dependencies follow the latest run
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn effects_rerun_only_for_keys_read_last_time(
        switches in prop::collection::vec(any::<bool>(), 1..10),
    ) {
        let store = Store::new(Map::new());
        store.set("use_b", false);
        store.set("b", 0);
        store.set("c", 0);
        let runs = Rc::new(RefCell::new(0u32));
        let (s, r) = (store.clone(), Rc::clone(&runs));
        let effect = run_effect(move || {
            *r.borrow_mut() += 1;
            if s.get("use_b").is_truthy() {
                let _ = s.get("b");
            } else {
                let _ = s.get("c");
            }
        });

        let mut counter = 0;
        for use_b in switches {
            store.set("use_b", use_b);
            counter += 1;
            let before = *runs.borrow();
            store.set("b", counter);
            store.set("c", counter);
            prop_assert_eq!(*runs.borrow(), before + 1);
            prop_assert_eq!(store.subscriber_count("b"), usize::from(use_b));
            prop_assert_eq!(store.subscriber_count("c"), usize::from(!use_b));
        }
        effect.dispose();
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Disposal is final
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn disposed_effects_never_run(
        writes in prop::collection::vec((arb_key(), -50i32..50), 0..20),
    ) {
        let store = store_with(&[0, 0, 0, 0]);
        let s = store.clone();
        let effect = run_effect(move || {
            for key in KEYS {
                let _ = s.get(key);
            }
        });
        effect.dispose();
        for (key, v) in writes {
            store.set(key, v);
        }
        prop_assert_eq!(effect.run_count(), 1);
        prop_assert_eq!(effect.dependency_count(), 0);
        for key in KEYS {
            prop_assert_eq!(store.subscriber_count(key), 0);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Derived values stay current
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn derived_sum_tracks_every_write(
        writes in prop::collection::vec((arb_key(), -100i32..100), 0..30),
    ) {
        let store = store_with(&[0, 0, 0, 0]);
        let cache = DerivedCache::new();
        let s = store.clone();
        cache.define("sum", move || {
            Value::from(KEYS.iter().map(|k| s.get(k).as_f64().unwrap_or(0.0)).sum::<f64>())
        });

        for (key, v) in writes {
            store.set(key, v);
            let expected: f64 = KEYS.iter().map(|k| store.peek(k).as_f64().unwrap_or(0.0)).sum();
            prop_assert_eq!(cache.get("sum"), Value::from(expected));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Path-sensitive tracking
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn path_writes_reach_only_their_readers(value in -1000i32..1000) {
        let user = Object::new();
        user.insert("name", "ada");
        user.insert("age", 36);
        let store = Store::new(Map::new());
        store.set("user", user);

        let name_runs = Rc::new(RefCell::new(0u32));
        let (s, r) = (store.clone(), Rc::clone(&name_runs));
        let reader = run_effect(move || {
            let _ = s.get_path("user.name");
            *r.borrow_mut() += 1;
        });

        let changed = store.set_path("user.age", value).expect("user is an object");
        prop_assert_eq!(changed, value != 36);
        prop_assert_eq!(*name_runs.borrow(), 1);

        store.set_path("user.name", format!("ada-{value}")).expect("user is an object");
        prop_assert_eq!(*name_runs.borrow(), 2);
        reader.dispose();
    }
}
