#![forbid(unsafe_code)]

//! Named-event publish/subscribe.
//!
//! # Invariants
//!
//! 1. `emit` invokes the callbacks registered at the moment it starts, in
//!    registration order. Callbacks added or removed during an emission
//!    take effect from the next one.
//! 2. A failing callback is logged; the rest still run.
//! 3. [`BusSubscription`] holds the bus weakly, so an outstanding
//!    subscription never keeps a bus alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use bindery_core::Value;
use tracing::{error, trace};

/// Error a subscriber may report.
pub type SubscriberError = Box<dyn std::error::Error>;

/// A bus callback.
pub type BusCallback = Rc<dyn Fn(&Value) -> Result<(), SubscriberError>>;

type Subscribers = RefCell<AHashMap<String, Vec<BusCallback>>>;

/// In-process event bus. Cloning shares the subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<Subscribers>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`.
    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&Value) -> Result<(), SubscriberError> + 'static,
    ) -> BusSubscription {
        self.subscribe(event, Rc::new(callback))
    }

    /// Register an existing callback handle, e.g. one that will later be
    /// passed to [`off`](Self::off).
    pub fn subscribe(&self, event: &str, callback: BusCallback) -> BusSubscription {
        self.inner
            .borrow_mut()
            .entry(event.to_owned())
            .or_default()
            .push(Rc::clone(&callback));
        BusSubscription {
            bus: Rc::downgrade(&self.inner),
            event: event.to_owned(),
            callback,
        }
    }

    /// Remove the first registration of `callback` for `event`.
    pub fn off(&self, event: &str, callback: &BusCallback) -> bool {
        remove(&self.inner, event, callback)
    }

    /// Invoke every callback for `event` with `payload`. Returns how many
    /// callbacks ran.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<BusCallback> = self
            .inner
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for callback in &snapshot {
            if let Err(err) = callback(payload) {
                error!(message = "bus.subscriber_failed", event, error = %err);
            }
        }
        trace!(message = "bus.emit", event, callbacks = snapshot.len());
        snapshot.len()
    }

    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.borrow().get(event).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut events: Vec<(&String, usize)> = inner.iter().map(|(k, v)| (k, v.len())).collect();
        events.sort();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}

fn remove(subscribers: &Subscribers, event: &str, callback: &BusCallback) -> bool {
    let mut table = subscribers.borrow_mut();
    let Some(list) = table.get_mut(event) else {
        return false;
    };
    let Some(index) = list.iter().position(|c| Rc::ptr_eq(c, callback)) else {
        return false;
    };
    list.remove(index);
    if list.is_empty() {
        table.remove(event);
    }
    true
}

/// One registration on an [`EventBus`].
#[must_use = "dropping a subscription keeps the callback registered; call cancel() to remove it"]
pub struct BusSubscription {
    bus: Weak<Subscribers>,
    event: String,
    callback: BusCallback,
}

impl BusSubscription {
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn callback(&self) -> &BusCallback {
        &self.callback
    }

    /// Unsubscribe. Returns `false` if the registration was already gone.
    pub fn cancel(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| remove(&bus, &self.event, &self.callback))
    }
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSubscription")
            .field("event", &self.event)
            .finish()
    }
}

thread_local! {
    static GLOBAL: EventBus = EventBus::new();
}

/// The process-wide bus of the current thread.
#[must_use]
pub fn global() -> EventBus {
    GLOBAL.with(EventBus::clone)
}
