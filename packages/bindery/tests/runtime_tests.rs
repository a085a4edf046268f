/// End-to-end tests: fragments mounted into a runtime, fed through sources and
/// data commands.
use bindery::{
    to_html, MergeType, Node, Options, ProviderRegistry, Row, Runtime, RuntimeError, Source,
    SourceOptions, StaticProvider,
};
use serde_json::{json, Value as JsonValue};
use std::rc::Rc;

fn rows(value: JsonValue) -> Vec<Row> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn task_list() -> Node {
    Node::element("ul")
        .with_attr("core", "list")
        .with_attr("source", "db.tasks")
        .with_child(
            Node::element("face")
                .with_attr("filter", "done")
                .with_child(Node::element("li").with_attr("class", "done").with_child(Node::text("@title"))),
        )
        .with_child(Node::element("face").with_child(Node::element("li").with_child(Node::text("@title"))))
        .with_child(Node::element("else-layout").with_child(Node::element("p").with_child(Node::text("No tasks"))))
}

#[tokio::test]
async fn test_data_command_feeds_list() {
    let runtime = Runtime::new(Options::default()).unwrap();
    runtime.register_provider(
        ProviderRegistry::DEFAULT,
        Rc::new(StaticProvider::new().with(
            "db",
            vec![rows(json!([
                {"id": 1, "title": "write", "done": true},
                {"id": 2, "title": "review", "done": false}
            ]))],
        )),
    );

    let loader = Node::element("div")
        .with_attr("core", "source")
        .with_attr("name", "db")
        .with_child(Node::element("member").with_attr("name", "tasks").with_attr("key-field", "id"));
    let list = task_list();
    runtime.mount(&[loader, list.clone()]).await.unwrap();
    runtime.settle().await.unwrap();

    assert_eq!(
        to_html(&list.children()),
        "<li class=\"done\">write</li><li>review</li>"
    );
}

#[tokio::test]
async fn test_bindings_follow_source_updates() {
    let runtime = Runtime::new(Options::default()).unwrap();
    let heading = Node::element("h1")
        .with_attr("title", "[##db.page.title|(Untitled)##]")
        .with_child(Node::text("{## upper(db.page.title) ##} ({## len(db.tasks.title) ##})"));
    runtime.mount(&[heading.clone()]).await.unwrap();
    assert_eq!(heading.attribute("title").unwrap(), "Untitled");

    runtime.set_as_source("db.page", json!({"title": "inbox"}));
    runtime.set_as_source("db.tasks", json!([{"title": "a"}, {"title": "b"}]));
    runtime.settle().await.unwrap();

    assert_eq!(heading.attribute("title").unwrap(), "inbox");
    assert_eq!(heading.inner_text(), "INBOX (2)");
}

#[tokio::test]
async fn test_list_rerenders_only_changed_rows() {
    let runtime = Runtime::new(Options::default()).unwrap();
    let keyed = |value: JsonValue| {
        Source::with_options(
            "db.tasks",
            rows(value),
            SourceOptions {
                merge_type: MergeType::Append,
                key_field_name: Some("id".into()),
                ..Default::default()
            },
        )
    };
    runtime.set_source(keyed(json!([
        {"id": 1, "title": "one", "done": false},
        {"id": 2, "title": "two", "done": false}
    ])));
    let list = task_list();
    runtime.mount(&[list.clone()]).await.unwrap();
    let before = list.children();

    runtime.set_source(keyed(json!([{"id": 2, "title": "two", "done": true}])));
    runtime.settle().await.unwrap();
    let after = list.children();

    assert!(before[0].ptr_eq(&after[0]));
    assert!(!before[1].ptr_eq(&after[1]));
    assert_eq!(after[1].attribute("class").unwrap(), "done");
}

#[tokio::test]
async fn test_empty_source_uses_else_layout() {
    let runtime = Runtime::new(Options::default()).unwrap();
    runtime.set_as_source("db.tasks", json!([]));
    let list = task_list();
    runtime.mount(&[list.clone()]).await.unwrap();

    assert_eq!(to_html(&list.children()), "<p>No tasks</p>");
}

#[tokio::test]
async fn test_passthrough_wrappers_are_unwrapped() {
    let runtime = Runtime::new(Options::default()).unwrap();
    let root = Node::element("div").with_child(
        Node::element("basis")
            .with_child(Node::element("span").with_child(Node::text("[##ui.user.name##]"))),
    );
    runtime.set_as_source("ui.user", json!({"name": "ada"}));
    runtime.mount(&[root.clone()]).await.unwrap();

    assert_eq!(to_html(&[root]), "<div><span>ada</span></div>");
}

#[tokio::test]
async fn test_dispose_stops_updates() {
    let runtime = Runtime::new(Options::default()).unwrap();
    let text = Node::text("[##db.page.title##]");
    runtime.mount(&[Node::element("p").with_child(text.clone())]).await.unwrap();

    runtime.set_as_source("db.page", json!({"title": "first"}));
    runtime.settle().await.unwrap();
    assert_eq!(text.text_content().unwrap(), "first");

    runtime.dispose().await;
    runtime.set_as_source("db.page", json!({"title": "second"}));
    runtime.settle().await.unwrap();
    assert_eq!(text.text_content().unwrap(), "first");
}

#[tokio::test]
async fn test_unknown_provider_fails_mount() {
    let runtime = Runtime::new(Options::default()).unwrap();
    let loader = Node::element("div")
        .with_attr("core", "source")
        .with_attr("name", "db")
        .with_attr("provider", "remote");

    let err = runtime.mount(&[loader]).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownProvider(name) if name == "remote"));
}
