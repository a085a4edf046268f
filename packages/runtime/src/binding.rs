use crate::component::{into_component, Component, ComponentCore, Priority};
use crate::dispatcher::Dispatcher;
use crate::error::RuntimeResult;
use async_trait::async_trait;
use bindery_dom::Node;
use bindery_source::{Context, Source};
use bindery_token::{compile, Token};
use std::rc::Rc;
use tracing::trace;

/// Keeps a text node's content in sync with its binding
pub struct TextBinding {
    core: ComponentCore,
    token: Token,
}

impl TextBinding {
    pub fn create(node: Node, context: &Context, dispatcher: &Dispatcher) -> RuntimeResult<Rc<dyn Component>> {
        let text = node.text_content().unwrap_or_default();
        let token = compile(&text, context.patterns())?;
        Ok(into_component(Self {
            core: ComponentCore::new(node, context, Priority::Normal, dispatcher),
            token,
        }))
    }

    pub fn token(&self) -> &Token {
        &self.token
    }
}

#[async_trait(?Send)]
impl Component for TextBinding {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    async fn initialize(&self) -> RuntimeResult<()> {
        self.core.add_trigger(self.token.source_names());
        Ok(())
    }

    async fn render(&self, _source: Option<Rc<Source>>) -> RuntimeResult<()> {
        let Some(context) = self.core.context() else {
            return Ok(());
        };
        let text = self.token.get_string(&context, false).await?;
        trace!(text = %text, "Text binding rendered");
        self.core.node().set_text(text);
        Ok(())
    }
}

/// Keeps one attribute of an element in sync with its binding
pub struct AttributeBinding {
    core: ComponentCore,
    attribute: String,
    token: Token,
}

impl AttributeBinding {
    pub fn create(
        node: Node,
        attribute: &str,
        context: &Context,
        dispatcher: &Dispatcher,
    ) -> RuntimeResult<Rc<dyn Component>> {
        let text = node.attribute(attribute).unwrap_or_default();
        let token = compile(&text, context.patterns())?;
        Ok(into_component(Self {
            core: ComponentCore::new(node, context, Priority::Normal, dispatcher),
            attribute: attribute.to_string(),
            token,
        }))
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

#[async_trait(?Send)]
impl Component for AttributeBinding {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    async fn initialize(&self) -> RuntimeResult<()> {
        self.core.add_trigger(self.token.source_names());
        Ok(())
    }

    async fn render(&self, _source: Option<Rc<Source>>) -> RuntimeResult<()> {
        let Some(context) = self.core.context() else {
            return Ok(());
        };
        let value = self.token.get_string(&context, false).await?;
        self.core.node().set_attribute(&self.attribute, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::on_trigger;
    use bindery_source::Options;
    use serde_json::json;

    #[tokio::test]
    async fn test_text_binding_follows_source() {
        let context = Context::new(Options::default()).unwrap();
        let dispatcher = Dispatcher::new();
        let node = Node::text("Hello [##db.user.name|(stranger)##]");
        let binding = TextBinding::create(node.clone(), &context, &dispatcher).unwrap();

        binding.initialize().await.unwrap();
        on_trigger(&binding, None).await.unwrap();
        assert_eq!(node.text_content().unwrap(), "Hello stranger");

        context.set_as_source("db.user", json!({"name": "Ada"}));
        dispatcher.drain().await.unwrap();
        assert_eq!(node.text_content().unwrap(), "Hello Ada");
    }

    #[tokio::test]
    async fn test_attribute_binding_sets_value() {
        let context = Context::new(Options::default()).unwrap();
        let dispatcher = Dispatcher::new();
        context.set_as_source("db.user", json!({"id": 7}));
        let node = Node::element("a").with_attr("href", "/users/[##db.user.id##]");
        let binding = AttributeBinding::create(node.clone(), "href", &context, &dispatcher).unwrap();

        binding.initialize().await.unwrap();
        assert_eq!(binding.core().trigger_ids(), vec!["db.user".to_string()]);
        on_trigger(&binding, None).await.unwrap();
        assert_eq!(node.attribute("href").unwrap(), "/users/7");
    }
}
