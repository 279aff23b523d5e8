#![forbid(unsafe_code)]

//! Declarative event wiring (`data-on="event:method; ..."`).

use std::rc::Rc;

use bindery_core::HostEvent;
use bindery_core::NodeId;
use bindery_core::markup::parse_events;
use tracing::warn;

use crate::controller::Instance;
use crate::scope;

/// Attach a listener for every event declaration on `scope` and its owned
/// descendants. Declarations naming something that is not a method are
/// logged and left inert. Returns the number of listeners attached.
pub(crate) fn init_events(instance: &Instance, scope: NodeId) -> usize {
    let tree = instance.tree();
    let attr = &instance.markup().on;
    let mut attached = 0;
    for node in scope::scoped_nodes(instance, scope, attr) {
        let Some(raw) = tree.attribute(node, attr) else {
            continue;
        };
        for decl in parse_events(&raw) {
            if !instance.is_callable(&decl.method) {
                warn!(
                    message = "controller.missing_method",
                    controller = %instance.name(),
                    node = %node,
                    event = %decl.event,
                    method = %decl.method
                );
                continue;
            }
            let weak = instance.downgrade();
            let method = decl.method;
            let listener = tree.listen(
                node,
                &decl.event,
                Rc::new(move |event: &HostEvent| {
                    let Some(instance) = weak.upgrade() else {
                        return;
                    };
                    event.set_current_binding(Some(node));
                    let _ = instance.call(&method, Some(event));
                }),
            );
            let tree = instance.tree();
            instance.add_cleanup(node, Box::new(move || tree.unlisten(node, listener)));
            attached += 1;
        }
    }
    attached
}
