//! The `source` command: loads result sets through a provider and publishes them.
//!
//! ```html
//! <div core="source" name="db" provider="default" region="[##ui.filter.region##]">
//!   <member name="users" key-field="id" merge-type="append"></member>
//!   <member name="totals"></member>
//! </div>
//! ```
//!
//! Result set `i` is published as `<name>.<member i>`. Any other attribute is passed
//! to the provider as a parameter; bindings in parameters reload the data when their
//! sources change.

use crate::component::{into_component, Component, ComponentCore, Priority};
use crate::error::{RuntimeError, RuntimeResult};
use crate::provider::{with_retry, DataProvider, Parameters, ProviderRegistry, ResultSets};
use crate::registry::CommandSetup;
use async_trait::async_trait;
use bindery_dom::Node;
use bindery_source::{MergeType, Source, SourceOptions};
use bindery_token::{compile, Token};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, instrument};

pub const DEFAULT_RETRIES: usize = 3;

const RESERVED_ATTRIBUTES: &[&str] = &["name", "provider", "retry", "priority"];

#[derive(Debug, Clone)]
struct Member {
    name: String,
    options: SourceOptions,
}

impl Member {
    fn from_node(node: &Node) -> RuntimeResult<Self> {
        let name = node
            .attribute("name")
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| RuntimeError::missing_attribute("member", "name"))?;
        let merge_type = match node.attribute("merge-type").as_deref().map(str::trim) {
            None | Some("") | Some("replace") => MergeType::Replace,
            Some("append") => MergeType::Append,
            Some(other) => {
                return Err(RuntimeError::InvalidMarkup(format!(
                    "member '{}' has unknown merge-type '{}'",
                    name, other
                )))
            }
        };
        Ok(Self {
            name: name.trim().to_string(),
            options: SourceOptions {
                merge_type,
                key_field_name: node.attribute("key-field"),
                status_field_name: node.attribute("status-field"),
                ..Default::default()
            },
        })
    }
}

pub struct SourceCommand {
    core: ComponentCore,
    name: String,
    provider: Rc<dyn DataProvider>,
    members: Vec<Member>,
    parameters: Vec<(String, Token)>,
    retries: usize,
}

impl SourceCommand {
    /// Factory for the command registry, resolving providers from `providers`
    pub fn factory(
        providers: ProviderRegistry,
    ) -> impl Fn(CommandSetup) -> RuntimeResult<Rc<dyn Component>> {
        move |setup| Self::create(setup, &providers)
    }

    pub fn create(setup: CommandSetup, providers: &ProviderRegistry) -> RuntimeResult<Rc<dyn Component>> {
        let node = setup.node;
        let tag = node.tag().unwrap_or_default();
        let name = node
            .attribute("name")
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| RuntimeError::missing_attribute(&tag, "name"))?;
        let provider = providers.get(
            &node
                .attribute("provider")
                .unwrap_or_else(|| ProviderRegistry::DEFAULT.to_string()),
        )?;
        let retries = match node.attribute("retry") {
            Some(value) => value.trim().parse().map_err(|_| {
                RuntimeError::InvalidMarkup(format!("retry must be a number, got '{}'", value))
            })?,
            None => DEFAULT_RETRIES,
        };
        let priority = node
            .attribute("priority")
            .and_then(|value| Priority::parse(&value))
            .unwrap_or(Priority::High);

        let members = node
            .children()
            .into_iter()
            .filter(|child| child.tag().is_some_and(|t| t.eq_ignore_ascii_case("member")))
            .map(|child| {
                let member = Member::from_node(&child);
                child.detach();
                member
            })
            .collect::<RuntimeResult<Vec<_>>>()?;

        let command_attribute = &setup.context.options().command_attribute;
        let mut parameters = Vec::new();
        for (attribute, value) in node.attributes() {
            let lowered = attribute.to_lowercase();
            if lowered == command_attribute.to_lowercase()
                || RESERVED_ATTRIBUTES.contains(&lowered.as_str())
            {
                continue;
            }
            parameters.push((attribute, compile(&value, setup.context.patterns())?));
        }

        debug!(source = %name, members = members.len(), parameters = parameters.len(), "Data command created");
        Ok(into_component(Self {
            core: ComponentCore::new(node, &setup.context, priority, &setup.dispatcher),
            name: name.trim().to_lowercase(),
            provider,
            members,
            parameters,
            retries,
        }))
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|member| format!("{}.{}", self.name, member.name))
            .collect()
    }
}

#[async_trait(?Send)]
impl Component for SourceCommand {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    async fn initialize(&self) -> RuntimeResult<()> {
        self.core
            .add_trigger(self.parameters.iter().flat_map(|(_, token)| token.source_names()));
        Ok(())
    }

    #[instrument(skip_all, fields(source = %self.name))]
    async fn render(&self, _source: Option<Rc<Source>>) -> RuntimeResult<()> {
        let Some(context) = self.core.context() else {
            return Ok(());
        };

        let mut parameters = Parameters::new();
        for (name, token) in &self.parameters {
            parameters.insert(name.clone(), token.get_value(&context, false).await?);
        }

        let failure: RefCell<Option<RuntimeError>> = RefCell::new(None);
        let (context, parameters, failure) = (&context, &parameters, &failure);
        let (provider, name, members, core) = (&self.provider, &self.name, &self.members, &self.core);

        with_retry(self.retries, move |_| async move {
            let mut on_data = |result_sets: ResultSets| -> bool {
                if core.is_disposed() {
                    return false;
                }
                if result_sets.len() != members.len() {
                    *failure.borrow_mut() = Some(RuntimeError::MemberCountMismatch {
                        source_name: name.clone(),
                        expected: members.len(),
                        actual: result_sets.len(),
                    });
                    return false;
                }
                for (member, rows) in members.iter().zip(result_sets) {
                    let id = format!("{}.{}", name, member.name);
                    context.set_source(Source::with_options(id, rows, member.options.clone()));
                }
                true
            };
            provider.load_data(context, name, parameters, &mut on_data).await
        })
        .await?;

        let failed = failure.borrow_mut().take();
        failed.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ComponentCollection;
    use crate::dispatcher::Dispatcher;
    use crate::provider::StaticProvider;
    use crate::registry::CommandRegistry;
    use bindery_source::{Context, Options, Row};
    use serde_json::{json, Value as JsonValue};

    fn rows(value: JsonValue) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn setup(provider: StaticProvider) -> (Context, CommandRegistry) {
        let providers = ProviderRegistry::new();
        providers.register(ProviderRegistry::DEFAULT, Rc::new(provider));
        let registry = CommandRegistry::new();
        registry.register("source", SourceCommand::factory(providers));
        (Context::new(Options::default()).unwrap(), registry)
    }

    fn command(members: &[&str]) -> Node {
        Node::element("div")
            .with_attr("core", "source")
            .with_attr("name", "db")
            .with_children(
                members
                    .iter()
                    .map(|m| Node::element("member").with_attr("name", *m)),
            )
    }

    #[tokio::test]
    async fn test_publishes_each_member() {
        let provider = StaticProvider::new().with(
            "db",
            vec![rows(json!([{"id": 1}, {"id": 2}])), rows(json!([{"total": 2}]))],
        );
        let (context, registry) = setup(provider);
        let root = command(&["users", "totals"]);
        let collection =
            ComponentCollection::from_roots(&[root.clone()], context.clone(), registry, Dispatcher::new())
                .unwrap();

        collection.run().await.unwrap();

        assert_eq!(context.try_to_get_source("db.users").unwrap().len(), 2);
        assert_eq!(context.try_to_get_source("db.totals").unwrap().rows()[0]["total"], json!(2));
        assert_eq!(root.child_count(), 0);
    }

    #[tokio::test]
    async fn test_member_count_mismatch() {
        let provider = StaticProvider::new().with("db", vec![rows(json!([{"id": 1}]))]);
        let (context, registry) = setup(provider);
        let collection = ComponentCollection::from_roots(
            &[command(&["users", "totals"])],
            context.clone(),
            registry,
            Dispatcher::new(),
        )
        .unwrap();

        let err = collection.run().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::MemberCountMismatch { expected: 2, actual: 1, .. }
        ));
        assert!(context.try_to_get_source("db.users").is_none());
    }

    #[tokio::test]
    async fn test_parameter_change_reloads() {
        let provider = StaticProvider::new().with("db", vec![rows(json!([{"id": 1}]))]);
        let (context, registry) = setup(provider);
        let dispatcher = Dispatcher::new();
        let root = command(&["users"]).with_attr("region", "[##ui.filter.region##]");
        let collection =
            ComponentCollection::from_roots(&[root], context.clone(), registry, dispatcher.clone()).unwrap();
        collection.run().await.unwrap();
        assert_eq!(context.try_to_get_source("db.users").unwrap().versions(), &[0]);

        context.set_as_source("ui.filter", json!({"region": "eu"}));
        dispatcher.drain().await.unwrap();
        assert_eq!(context.try_to_get_source("db.users").unwrap().versions(), &[1]);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let (context, registry) = setup(StaticProvider::new());
        let node = Node::element("div").with_attr("core", "source");
        let setup = CommandSetup {
            node,
            context,
            registry: registry.create_scope(),
            dispatcher: Dispatcher::new(),
        };
        let err = registry.create("source", setup).err().unwrap();
        assert!(matches!(err, RuntimeError::MissingAttribute { .. }));
    }
}
