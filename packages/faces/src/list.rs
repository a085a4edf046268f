use crate::command::{take_section, Arrangement, FaceCommand, Settings};
use crate::render::RenderPass;
use crate::template::clone_all;
use bindery_dom::Node;
use bindery_runtime::RuntimeResult;
use bindery_source::Source;
use bindery_token::ValueKind;

/// Flat list of rows, optionally chunked into groups of `rowcount`.
///
/// `rowcount` may be bound; a value that is not a positive integer disables grouping.
/// A `divider` template separates consecutive groups; an `incomplete` template fills
/// each missing slot of the last group.
#[derive(Debug)]
pub struct List {
    levels: Vec<String>,
    divider: Vec<Node>,
    incomplete: Vec<Node>,
}

pub type ListCommand = FaceCommand<List>;

impl Arrangement for List {
    const KEYWORD: &'static str = "list";
    const SETTINGS: &'static [(&'static str, ValueKind)] = &[("rowcount", ValueKind::Integer)];

    fn from_node(node: &Node) -> RuntimeResult<Self> {
        let levels = split_levels(&node.attribute("level").unwrap_or_default());
        Ok(Self {
            levels: if levels.is_empty() { vec!["1".to_string()] } else { levels },
            divider: take_section(node, "divider"),
            incomplete: take_section(node, "incomplete"),
        })
    }

    fn arrange(&self, pass: &mut RenderPass<'_>, source: &Source, settings: &Settings) -> Vec<Node> {
        let row_count = settings
            .get("rowcount")
            .and_then(|value| value.as_u64())
            .map_or(0, |count| count as usize);
        let mut out = Vec::new();
        let mut rendered = 0usize;
        for index in 0..source.len() {
            let Some(result) = pass.render_row("", source, index, &self.levels) else {
                continue;
            };
            if row_count > 0 && rendered > 0 && rendered % row_count == 0 {
                out.extend(clone_all(&self.divider));
            }
            out.extend(result.nodes().iter().cloned());
            rendered += 1;
        }

        if row_count > 0 && rendered % row_count != 0 {
            for _ in 0..row_count - rendered % row_count {
                out.extend(clone_all(&self.incomplete));
            }
        }
        out
    }
}

pub(crate) fn split_levels(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|level| !level.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::register_commands;
    use bindery_dom::{to_html, Node};
    use bindery_runtime::{CommandRegistry, ComponentCollection, Dispatcher};
    use bindery_source::{Context, Options};
    use serde_json::json;

    fn list(rowcount: Option<&str>) -> Node {
        let node = Node::element("ul")
            .with_attr("core", "list")
            .with_attr("source", "db.items")
            .with_child(Node::element("face").with_child(Node::element("li").with_child(Node::text("@name"))))
            .with_child(Node::element("divider").with_child(Node::element("hr")))
            .with_child(Node::element("incomplete").with_child(Node::element("li").with_attr("class", "pad")))
            .with_child(Node::element("else-layout").with_child(Node::text("empty")));
        if let Some(count) = rowcount {
            node.set_attribute("rowcount", count);
        }
        node
    }

    async fn mounted(root: &Node, context: &Context) -> (ComponentCollection, Dispatcher) {
        let registry = CommandRegistry::new();
        register_commands(&registry);
        let dispatcher = Dispatcher::new();
        let collection =
            ComponentCollection::from_roots(&[root.clone()], context.clone(), registry, dispatcher.clone()).unwrap();
        collection.run().await.unwrap();
        (collection, dispatcher)
    }

    #[tokio::test]
    async fn test_dividers_and_incomplete_padding() {
        let context = Context::new(Options::default()).unwrap();
        context.set_as_source(
            "db.items",
            json!([{"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}, {"name": "e"}]),
        );
        let root = list(Some("2"));
        let _mounted = mounted(&root, &context).await;

        assert_eq!(
            to_html(&root.children()),
            "<li>a</li><li>b</li><hr><li>c</li><li>d</li><hr><li>e</li><li class=\"pad\"></li>"
        );
    }

    #[tokio::test]
    async fn test_bound_rowcount_follows_its_source() {
        let context = Context::new(Options::default()).unwrap();
        context.set_as_source("db.items", json!([{"name": "a"}, {"name": "b"}, {"name": "c"}]));
        context.set_as_source("ui.grid", json!({"cols": 2}));
        let root = list(Some("[##ui.grid.cols##]"));
        let (_collection, dispatcher) = mounted(&root, &context).await;
        assert_eq!(
            to_html(&root.children()),
            "<li>a</li><li>b</li><hr><li>c</li><li class=\"pad\"></li>"
        );

        context.set_as_source("ui.grid", json!({"cols": 3}));
        assert_eq!(dispatcher.pending(), 1);
        dispatcher.drain().await.unwrap();
        assert_eq!(to_html(&root.children()), "<li>a</li><li>b</li><li>c</li>");

        context.set_as_source("ui.grid", json!({"cols": "many"}));
        dispatcher.drain().await.unwrap();
        assert_eq!(to_html(&root.children()), "<li>a</li><li>b</li><li>c</li>");
    }

    #[tokio::test]
    async fn test_filter_follows_the_sources_it_reads() {
        let context = Context::new(Options::default()).unwrap();
        context.set_as_source("db.items", json!([{"name": "a", "n": 2}, {"name": "b", "n": 5}]));
        context.set_as_source("ui.prefs", json!({"min": 1}));
        let root = Node::element("ul")
            .with_attr("core", "list")
            .with_attr("source", "db.items")
            .with_child(
                Node::element("face")
                    .with_attr("filter", "n > ui.prefs.min")
                    .with_child(Node::element("li").with_child(Node::text("@name"))),
            );
        let (_collection, dispatcher) = mounted(&root, &context).await;
        assert_eq!(to_html(&root.children()), "<li>a</li><li>b</li>");

        context.set_as_source("ui.prefs", json!({"min": 3}));
        assert_eq!(dispatcher.pending(), 1);
        dispatcher.drain().await.unwrap();
        assert_eq!(to_html(&root.children()), "<li>b</li>");
    }

    #[tokio::test]
    async fn test_else_layout_until_rows_arrive() {
        let context = Context::new(Options::default()).unwrap();
        context.set_as_source("db.items", json!([]));
        let root = list(None);
        let (_collection, dispatcher) = mounted(&root, &context).await;
        assert_eq!(to_html(&root.children()), "empty");

        context.set_as_source("db.items", json!([{"name": "x"}]));
        dispatcher.drain().await.unwrap();
        assert_eq!(to_html(&root.children()), "<li>x</li>");
    }
}
