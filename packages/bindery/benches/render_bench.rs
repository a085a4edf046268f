use bindery::{MergeType, Node, Options, Row, Runtime, Source, SourceOptions};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;

fn rows(count: usize, revision: usize) -> Vec<Row> {
    (0..count)
        .map(|id| {
            json!({"id": id, "title": format!("task {} r{}", id, revision), "done": id % 3 == 0})
                .as_object()
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

fn source(rows: Vec<Row>) -> Source {
    Source::with_options(
        "db.tasks",
        rows,
        SourceOptions {
            merge_type: MergeType::Append,
            key_field_name: Some("id".into()),
            ..Default::default()
        },
    )
}

fn list() -> Node {
    Node::element("ul")
        .with_attr("core", "list")
        .with_attr("source", "db.tasks")
        .with_child(
            Node::element("face").with_attr("filter", "done").with_child(
                Node::element("li")
                    .with_attr("class", "done task-@id")
                    .with_child(Node::text("@title")),
            ),
        )
        .with_child(
            Node::element("face").with_child(
                Node::element("li")
                    .with_attr("class", "task-@id")
                    .with_child(Node::text("@title")),
            ),
        )
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn mounted(count: usize) -> Runtime {
    let runtime = Runtime::new(Options::default()).unwrap();
    runtime.set_source(source(rows(count, 0)));
    block_on(runtime.mount(&[list()])).unwrap();
    runtime
}

fn rerender_unchanged(c: &mut Criterion) {
    c.bench_function("rerender_1000_rows_one_changed", |b| {
        b.iter_batched(
            || mounted(1000),
            |runtime| {
                let mut changed = rows(1, 1);
                changed[0].insert("id".into(), json!(500));
                runtime.set_source(source(changed));
                block_on(runtime.settle()).unwrap();
                black_box(runtime)
            },
            BatchSize::LargeInput,
        )
    });
}

fn rerender_all_changed(c: &mut Criterion) {
    c.bench_function("rerender_1000_rows_all_changed", |b| {
        b.iter_batched(
            || mounted(1000),
            |runtime| {
                runtime.set_source(source(rows(1000, 1)));
                block_on(runtime.settle()).unwrap();
                black_box(runtime)
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, rerender_unchanged, rerender_all_changed);
criterion_main!(benches);
