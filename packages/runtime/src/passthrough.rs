use crate::component::{into_component, Component, ComponentCore, Priority};
use crate::dispatcher::Dispatcher;
use crate::error::RuntimeResult;
use async_trait::async_trait;
use bindery_dom::Node;
use bindery_source::{Context, Source};
use std::rc::Rc;
use tracing::trace;

/// Wrapper tag that is recognized but has no behavior of its own.
///
/// After the normal class has rendered, the wrapper is replaced in its parent by its
/// children. A detached wrapper is left alone.
pub struct Passthrough {
    core: ComponentCore,
}

impl Passthrough {
    pub fn create(node: Node, context: &Context, dispatcher: &Dispatcher) -> Rc<dyn Component> {
        into_component(Self {
            core: ComponentCore::new(node, context, Priority::Low, dispatcher),
        })
    }
}

#[async_trait(?Send)]
impl Component for Passthrough {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    async fn render(&self, _source: Option<Rc<Source>>) -> RuntimeResult<()> {
        let node = self.core.node();
        let Some(parent) = node.parent() else {
            return Ok(());
        };
        let Some(index) = parent.children().iter().position(|child| child.ptr_eq(node)) else {
            return Ok(());
        };
        let children = node.take_children();
        trace!(tag = %node.tag().unwrap_or_default(), children = children.len(), "Unwrapping passthrough");
        parent.remove_child(node);
        for (offset, child) in children.into_iter().enumerate() {
            parent.insert_child(index + offset, &child);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::on_trigger;
    use bindery_source::Options;

    #[tokio::test]
    async fn test_wrapper_is_replaced_by_children() {
        let context = Context::new(Options::default()).unwrap();
        let wrapper = Node::element("basis")
            .with_child(Node::text("a"))
            .with_child(Node::element("b"));
        let root = Node::element("div")
            .with_child(Node::text("<"))
            .with_child(wrapper.clone())
            .with_child(Node::text(">"));

        let component = Passthrough::create(wrapper, &context, &Dispatcher::new());
        assert_eq!(component.core().priority(), Priority::Low);
        on_trigger(&component, None).await.unwrap();

        assert_eq!(bindery_dom::to_html(&[root]), "<div>&lt;a<b></b>&gt;</div>");
    }
}
