//! # Bindery
//!
//! Reactive data binding for HTML fragments.
//!
//! Bindings such as `[##db.user.name##]` or `{## len(db.tasks) ##}` inside text and
//! attributes re-render whenever the sources they read are set. Elements carrying a
//! command attribute (`core="list"`, `core="source"`, ...) become commands that render
//! collections or load data.
//!
//! ```no_run
//! use bindery::{Node, Options, Runtime};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let runtime = Runtime::new(Options::default())?;
//! let title = Node::element("h1").with_child(Node::text("[##db.page.title##]"));
//! runtime.mount(&[title.clone()]).await?;
//!
//! runtime.set_as_source("db.page", serde_json::json!({"title": "Hello"}));
//! runtime.settle().await?;
//! assert_eq!(title.inner_text(), "Hello");
//! # Ok(())
//! # }
//! ```
//!
//! All state is single-threaded (`Rc`); drive the futures on a current-thread runtime
//! or a `LocalSet`.

mod runtime;

pub use runtime::{default_registry, Runtime, LOG_ENV};

pub use bindery_dom::{to_html, to_html_with, HtmlOptions, Node, NodeKind};
pub use bindery_faces::{register_commands, Arrangement, FaceCommand, RenderStats};
pub use bindery_runtime::{
    CommandRegistry, CommandSetup, Component, ComponentCollection, DataProvider, Dispatcher,
    Priority, ProviderRegistry, RuntimeError, RuntimeResult, SourceCommand, StaticProvider,
};
pub use bindery_source::{
    Context, Logger, MergeType, Options, Row, Source, SourceError, SourceOptions, WireSource,
};
pub use bindery_token::{compile, parse_expression, Token, TokenError};
