#![forbid(unsafe_code)]

//! bindery: fine-grained reactivity and declarative controllers.
//!
//! ```ignore
//! use bindery::prelude::*;
//! use std::rc::Rc;
//!
//! let tree = Rc::new(MemoryTree::new());
//! let registry = Registry::new(tree.clone());
//! registry.register(
//!     "counter",
//!     ControllerDef::new("counter")
//!         .state("count", 0)
//!         .method("increment", |c, _| {
//!             let next = c.get("count").as_f64().unwrap_or(0.0) + 1.0;
//!             let _ = c.set("count", next);
//!             Value::Null
//!         }),
//! )?;
//! registry.start();
//! ```

pub use bindery_core::{
    BinderyError, DerivedCache, EffectHandle, HostEvent, HostTree, Map, Markup, MemoryTree,
    NodeId, Object, Result, Store, Value, is_tracking, run_effect, untracked,
};
pub use bindery_runtime::{
    Controller, ControllerDef, EventBus, Instance, Lifecycle, Overrides, Registry, bus,
};

/// Everything needed to define and mount controllers.
pub mod prelude {
    pub use bindery_core::{
        HostEvent, HostTree, Map, MemoryTree, NodeId, Object, Store, Value, run_effect,
        untracked,
    };
    pub use bindery_runtime::bus::global as global_bus;
    pub use bindery_runtime::{Controller, ControllerDef, Instance, Overrides, Registry};
}
