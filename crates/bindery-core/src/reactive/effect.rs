#![forbid(unsafe_code)]

//! Effect scheduler: tracked, synchronously re-run units of work.
//!
//! # Design
//!
//! An effect owns its body and the list of subscriber sets it joined during
//! its last run. Subscriber sets hold effects strongly; effects hold their
//! memberships weakly, so a set dropped together with its object releases
//! the effect without a reference cycle.
//!
//! # Failure Modes
//!
//! - **Body panics**: the [`StackGuard`] pops the effect stack during
//!   unwinding. Dependencies read before the panic stay registered.
//! - **Disposed mid-run**: the body finishes (cancellation is cooperative),
//!   but reads after disposal register nothing.
//! - **Captured store**: an effect whose body captures the store it reads is
//!   kept alive by that store until [`EffectHandle::dispose`] is called.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EFFECT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Running effects, innermost last. `None` marks an untracked section.
    static EFFECT_STACK: RefCell<Vec<Option<Rc<EffectInner>>>> = const { RefCell::new(Vec::new()) };
}

// ---------------------------------------------------------------------------
// Subscriber sets
// ---------------------------------------------------------------------------

/// Ordered set of effects depending on one store key.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    effects: RefCell<Vec<Rc<EffectInner>>>,
}

impl SubscriberSet {
    /// Add `effect`; returns false if it was already present.
    fn insert(&self, effect: &Rc<EffectInner>) -> bool {
        let mut effects = self.effects.borrow_mut();
        if effects.iter().any(|e| Rc::ptr_eq(e, effect)) {
            return false;
        }
        effects.push(Rc::clone(effect));
        true
    }

    fn remove(&self, effect: &EffectInner) {
        self.effects
            .borrow_mut()
            .retain(|e| !std::ptr::eq(Rc::as_ptr(e), effect));
    }

    pub(crate) fn len(&self) -> usize {
        self.effects.borrow().len()
    }

    /// Register the innermost running effect, if any.
    pub(crate) fn track(self: &Rc<Self>) {
        let Some(effect) = current_effect() else {
            return;
        };
        if effect.disposed.get() {
            return;
        }
        if self.insert(&effect) {
            effect.memberships.borrow_mut().push(Rc::downgrade(self));
        }
    }

    /// Run every subscribed effect once.
    ///
    /// The subscriber list is copied first: a re-run unsubscribes and
    /// resubscribes on this very set, which must not skip or repeat anyone.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<Rc<EffectInner>> = self.effects.borrow().clone();
        for effect in snapshot {
            effect.run();
        }
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

pub(crate) struct EffectInner {
    id: u64,
    body: Box<dyn Fn()>,
    memberships: RefCell<Vec<Weak<SubscriberSet>>>,
    disposed: Cell<bool>,
    runs: Cell<u64>,
}

impl EffectInner {
    fn run(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        self.leave_all();
        let _guard = StackGuard::push(Some(Rc::clone(self)));
        self.runs.set(self.runs.get() + 1);
        (self.body)();
    }

    fn leave_all(&self) {
        let memberships = std::mem::take(&mut *self.memberships.borrow_mut());
        for set in memberships.iter().filter_map(Weak::upgrade) {
            set.remove(self);
        }
    }
}

/// Pops the effect stack when dropped, including during unwinding.
struct StackGuard;

impl StackGuard {
    fn push(entry: Option<Rc<EffectInner>>) -> Self {
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn current_effect() -> Option<Rc<EffectInner>> {
    EFFECT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether a read right now would register a dependency.
#[must_use]
pub fn is_tracking() -> bool {
    current_effect().is_some()
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = StackGuard::push(None);
    f()
}

/// Handle to a running effect.
///
/// Dropping the handle does **not** stop the effect; call
/// [`dispose`](Self::dispose). Cloning yields another handle to the same
/// effect.
#[derive(Clone)]
pub struct EffectHandle {
    inner: Rc<EffectInner>,
}

impl EffectHandle {
    /// Stop the effect permanently. Idempotent.
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
        self.inner.leave_all();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of subscriber sets currently joined.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner
            .memberships
            .borrow()
            .iter()
            .filter(|set| set.strong_count() > 0)
            .count()
    }

    /// How many times the body has started (initial run included).
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.inner.id)
            .field("runs", &self.inner.runs.get())
            .field("dependencies", &self.dependency_count())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Run `body` now, tracking every store key it reads, and re-run it
/// synchronously whenever one of those keys is written with a new value.
pub fn run_effect(body: impl Fn() + 'static) -> EffectHandle {
    let inner = Rc::new(EffectInner {
        id: NEXT_EFFECT_ID.fetch_add(1, Ordering::Relaxed),
        body: Box::new(body),
        memberships: RefCell::new(Vec::new()),
        disposed: Cell::new(false),
        runs: Cell::new(0),
    });
    inner.run();
    EffectHandle { inner }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Store;
    use crate::value::Value;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let c = Rc::new(Cell::new(0));
        (Rc::clone(&c), c)
    }

    #[test]
    fn runs_immediately_and_on_change() {
        let store = Store::new(Default::default());
        store.set("a", 1);
        let (runs, r) = counter();
        let s = store.clone();
        let handle = run_effect(move || {
            let _ = s.get("a");
            r.set(r.get() + 1);
        });
        assert_eq!(runs.get(), 1);
        store.set("a", 2);
        assert_eq!(runs.get(), 2);
        assert_eq!(handle.run_count(), 2);
        handle.dispose();
    }

    #[test]
    fn reads_outside_effects_register_nothing() {
        let store = Store::new(Default::default());
        let _ = store.get("a");
        assert_eq!(store.subscriber_count("a"), 0);
        assert!(!is_tracking());
    }

    #[test]
    fn nested_effect_collects_its_own_dependencies() {
        let store = Store::new(Default::default());
        let (outer_runs, o) = counter();
        let (inner_runs, i) = counter();
        let s = store.clone();
        let inner_slot: Rc<RefCell<Option<EffectHandle>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&inner_slot);
        let outer = run_effect(move || {
            o.set(o.get() + 1);
            let _ = s.get("outer");
            if slot.borrow().is_none() {
                let s2 = s.clone();
                let i2 = Rc::clone(&i);
                let handle = run_effect(move || {
                    i2.set(i2.get() + 1);
                    let _ = s2.get("inner");
                });
                *slot.borrow_mut() = Some(handle);
            }
        });

        store.set("inner", 1);
        assert_eq!(inner_runs.get(), 2);
        assert_eq!(outer_runs.get(), 1, "inner read must not leak to outer");

        store.set("outer", 1);
        assert_eq!(outer_runs.get(), 2);
        assert_eq!(inner_runs.get(), 2);
        outer.dispose();
    }

    #[test]
    fn stale_dependencies_are_dropped_between_runs() {
        let store = Store::new(Default::default());
        store.set("flag", true);
        let (runs, r) = counter();
        let s = store.clone();
        let handle = run_effect(move || {
            r.set(r.get() + 1);
            if s.get("flag").is_truthy() {
                let _ = s.get("a");
            } else {
                let _ = s.get("b");
            }
        });
        assert_eq!(store.subscriber_count("a"), 1);
        store.set("flag", false);
        assert_eq!(store.subscriber_count("a"), 0);
        assert_eq!(store.subscriber_count("b"), 1);

        let before = runs.get();
        store.set("a", 99);
        assert_eq!(runs.get(), before, "stale key must not re-run the effect");
        handle.dispose();
    }

    #[test]
    fn dispose_stops_future_runs() {
        let store = Store::new(Default::default());
        let (runs, r) = counter();
        let s = store.clone();
        let handle = run_effect(move || {
            let _ = s.get("a");
            r.set(r.get() + 1);
        });
        handle.dispose();
        handle.dispose();
        store.set("a", 1);
        store.set("a", 2);
        assert_eq!(runs.get(), 1);
        assert!(handle.is_disposed());
        assert_eq!(handle.dependency_count(), 0);
        assert_eq!(store.subscriber_count("a"), 0);
    }

    #[test]
    fn panic_in_body_restores_stack() {
        let store = Store::new(Default::default());
        let s = store.clone();
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_effect(move || {
                let _ = s.get("a");
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert!(!is_tracking());

        let (runs, r) = counter();
        let s = store.clone();
        let handle = run_effect(move || {
            let _ = s.get("b");
            r.set(r.get() + 1);
        });
        store.set("b", 1);
        assert_eq!(runs.get(), 2);
        handle.dispose();
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let store = Store::new(Default::default());
        let s = store.clone();
        let handle = run_effect(move || {
            untracked(|| {
                let _ = s.get("quiet");
            });
            let _ = s.get("loud");
        });
        assert_eq!(store.subscriber_count("quiet"), 0);
        assert_eq!(store.subscriber_count("loud"), 1);
        handle.dispose();
    }

    #[test]
    fn self_write_converges_through_equality() {
        let store = Store::new(Default::default());
        store.set("n", 0);
        let s = store.clone();
        let handle = run_effect(move || {
            let n = s.get("n").as_f64().unwrap_or(0.0);
            if n < 3.0 {
                s.set("n", n + 1.0);
            }
        });
        assert_eq!(store.peek("n"), Value::from(3));
        handle.dispose();
    }

    #[test]
    fn self_write_of_nan_converges() {
        let store = Store::new(Default::default());
        store.set("x", 1);
        let s = store.clone();
        let handle = run_effect(move || {
            let x = s.get("x").as_f64().unwrap_or(0.0);
            s.set("x", x * f64::NAN);
        });
        assert!(store.peek("x").as_f64().is_some_and(f64::is_nan));
        assert_eq!(handle.run_count(), 2);
        handle.dispose();
    }
}
