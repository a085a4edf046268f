//! Shared plumbing of the collection-rendering commands.
//!
//! A command root names its source and declares its faces and layouts as children:
//!
//! ```html
//! <ul core="list" source="db.tasks">
//!   <face rowtype="odd"><li class="odd">@title</li></face>
//!   <face><li>@title</li></face>
//!   <layout><div class="tasks">@child</div></layout>
//!   <else-layout><p>Nothing to do</p></else-layout>
//! </ul>
//! ```
//!
//! Those children are detached when the command is created. Every render replaces the
//! root's children with the arranged output.

use crate::face::Face;
use crate::render::{RenderCache, RenderPass, RenderStats};
use crate::template::{attach_children, clone_all, take_template};
use async_trait::async_trait;
use bindery_dom::Node;
use bindery_runtime::{
    into_component, Component, CommandSetup, ComponentCore, Priority, RuntimeError, RuntimeResult,
};
use bindery_source::{Context, Source};
use bindery_token::{compile_as, Token, ValueKind};
use serde_json::Value as JsonValue;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, instrument};

/// Typed command attributes as resolved for one pass
pub type Settings = HashMap<&'static str, JsonValue>;

/// How a command lays rendered rows out
pub trait Arrangement: Sized + 'static {
    const KEYWORD: &'static str;

    /// Root attributes compiled as bindings of the given kind; they are resolved
    /// before every pass and their sources trigger re-renders
    const SETTINGS: &'static [(&'static str, ValueKind)] = &[];

    /// Read attributes and detach the arrangement's own template children
    fn from_node(node: &Node) -> RuntimeResult<Self>;

    /// Render the rows of `source` through `pass` into output nodes
    fn arrange(&self, pass: &mut RenderPass<'_>, source: &Source, settings: &Settings) -> Vec<Node>;
}

/// `layout` wraps the rendered rows at its `@child` anchor; `else-layout` replaces
/// them when no row rendered
#[derive(Debug, Default)]
pub struct Layout {
    wrapper: Vec<Node>,
    empty: Vec<Node>,
}

impl Layout {
    pub fn from_node(node: &Node) -> Self {
        let mut layout = Layout::default();
        for child in node.children() {
            match child.tag().map(|tag| tag.to_lowercase()).as_deref() {
                Some("layout") => {
                    layout.wrapper = take_template(&child);
                    child.detach();
                }
                Some("else-layout") => {
                    layout.empty = take_template(&child);
                    child.detach();
                }
                _ => {}
            }
        }
        layout
    }

    pub fn render(&self, rows: Vec<Node>) -> Vec<Node> {
        if rows.is_empty() {
            return clone_all(&self.empty);
        }
        if self.wrapper.is_empty() {
            return rows;
        }
        attach_children(&clone_all(&self.wrapper), rows)
    }
}

/// Detach and return the template of the first `tag` child, if any
pub fn take_section(node: &Node, tag: &str) -> Vec<Node> {
    let Some(section) = node
        .children()
        .into_iter()
        .find(|child| child.tag().is_some_and(|t| t.eq_ignore_ascii_case(tag)))
    else {
        return Vec::new();
    };
    section.detach();
    take_template(&section)
}


/// A face-rendering command parameterized by its arrangement
pub struct FaceCommand<A: Arrangement> {
    core: ComponentCore,
    source_id: String,
    faces: Vec<Face>,
    layout: Layout,
    settings: Vec<(&'static str, Token)>,
    arrangement: A,
    cache: RefCell<RenderCache>,
    last_stats: Cell<RenderStats>,
}

impl<A: Arrangement> FaceCommand<A> {
    pub fn create(setup: CommandSetup) -> RuntimeResult<Rc<dyn Component>> {
        let node = setup.node;
        let tag = node.tag().unwrap_or_default();
        let source_id = node
            .attribute("source")
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RuntimeError::missing_attribute(&tag, "source"))?;

        let settings = A::SETTINGS
            .iter()
            .filter_map(|&(name, kind)| node.attribute(name).map(|value| (name, kind, value)))
            .map(|(name, kind, value)| -> RuntimeResult<_> {
                Ok((name, compile_as(&value, setup.context.patterns(), kind)?))
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        let arrangement = A::from_node(&node)?;
        let layout = Layout::from_node(&node);
        let face_nodes: Vec<Node> = node
            .children()
            .into_iter()
            .filter(|child| child.tag().is_some_and(|t| t.eq_ignore_ascii_case("face")))
            .collect();
        let faces = face_nodes
            .iter()
            .enumerate()
            .map(|(index, face)| {
                face.detach();
                Face::from_node(index, face, setup.context.patterns())
            })
            .collect::<RuntimeResult<Vec<_>>>()?;

        let priority = node
            .attribute("priority")
            .and_then(|value| Priority::parse(&value))
            .unwrap_or_default();

        debug!(command = A::KEYWORD, source = %source_id, faces = faces.len(), "Face command created");
        Ok(into_component(Self {
            core: ComponentCore::new(node, &setup.context, priority, &setup.dispatcher),
            source_id,
            faces,
            layout,
            settings,
            arrangement,
            cache: RefCell::new(RenderCache::new()),
            last_stats: Cell::new(RenderStats::default()),
        }))
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats.get()
    }

    async fn render_pass(&self, context: &Context, source: &Source) -> RuntimeResult<Vec<Node>> {
        let mut compiled = Vec::with_capacity(self.faces.len());
        for face in &self.faces {
            compiled.push(face.compile(context, source).await?);
        }

        let mut settings = Settings::new();
        for (name, token) in &self.settings {
            settings.insert(*name, token.get_value(context, false).await?);
        }

        let previous = std::mem::take(&mut *self.cache.borrow_mut());
        let mut pass = RenderPass::new(compiled, &context.patterns().row, previous);
        let rows = self.arrangement.arrange(&mut pass, source, &settings);
        let (next, stats) = pass.finish();
        *self.cache.borrow_mut() = next;
        self.last_stats.set(stats);

        debug!(
            command = A::KEYWORD,
            rendered = stats.rendered,
            reused = stats.reused,
            skipped = stats.skipped,
            "Render pass finished"
        );
        Ok(self.layout.render(rows))
    }
}

#[async_trait(?Send)]
impl<A: Arrangement> Component for FaceCommand<A> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    async fn initialize(&self) -> RuntimeResult<()> {
        self.core.add_trigger([self.source_id.clone()]);
        self.core
            .add_trigger(self.faces.iter().flat_map(Face::source_names));
        self.core
            .add_trigger(self.settings.iter().flat_map(|(_, token)| token.source_names()));
        Ok(())
    }

    #[instrument(skip_all, fields(command = A::KEYWORD, source = %self.source_id))]
    async fn render(&self, _source: Option<Rc<Source>>) -> RuntimeResult<()> {
        let Some(context) = self.core.context() else {
            return Ok(());
        };
        // Always render the latest snapshot, whichever source triggered
        let Some(source) = context.try_to_get_source(&self.source_id) else {
            return Ok(());
        };
        let output = self.render_pass(&context, &source).await?;
        self.core.node().replace_children(output);
        Ok(())
    }

    async fn dispose(&self) {
        self.core.dispose();
        self.cache.borrow_mut().clear();
    }
}
