use crate::command::{Arrangement, FaceCommand, Settings};
use crate::render::RenderPass;
use crate::template::attach_children;
use bindery_dom::Node;
use bindery_runtime::RuntimeResult;
use bindery_source::{display_value, is_empty_value, Row, Source};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Rows nested by a parent/key column pair.
///
/// Each rendered row's children go into its `@child` anchor. Faces can tell nodes apart
/// by level: the depth (`1` for roots) and `parent` or `leaf`.
#[derive(Debug)]
pub struct Tree {
    parent_field: String,
    key_field: String,
}

pub type TreeCommand = FaceCommand<Tree>;

struct Walk<'s> {
    source: &'s Source,
    children: HashMap<String, Vec<usize>>,
    visited: HashSet<usize>,
}

impl Tree {
    fn field(&self, row: &Row, name: &str) -> Option<String> {
        row.get(name)
            .filter(|value| !is_empty_value(value))
            .map(display_value)
    }

    fn render_node(&self, pass: &mut RenderPass<'_>, walk: &mut Walk<'_>, index: usize, depth: usize) -> Vec<Node> {
        if !walk.visited.insert(index) {
            warn!(row = index, "Cycle in tree rows, subtree skipped");
            return Vec::new();
        }
        let kids = walk
            .source
            .row(index)
            .and_then(|row| self.field(row, &self.key_field))
            .and_then(|key| walk.children.get(&key).cloned())
            .unwrap_or_default();
        let kind = if kids.is_empty() { "leaf" } else { "parent" };
        let levels = [depth.to_string(), kind.to_string()];

        let Some(result) = pass.render_row("", walk.source, index, &levels) else {
            return Vec::new();
        };
        let mut nested = Vec::new();
        for kid in kids {
            nested.extend(self.render_node(pass, walk, kid, depth + 1));
        }
        attach_children(result.nodes(), nested)
    }
}

impl Arrangement for Tree {
    const KEYWORD: &'static str = "tree";

    fn from_node(node: &Node) -> RuntimeResult<Self> {
        let field = |name: &str, default: &str| {
            node.attribute(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Ok(Self {
            parent_field: field("parent-field", "parentid"),
            key_field: field("key-field", "id"),
        })
    }

    fn arrange(&self, pass: &mut RenderPass<'_>, source: &Source, _settings: &Settings) -> Vec<Node> {
        let keys: HashSet<String> = source
            .rows()
            .iter()
            .filter_map(|row| self.field(row, &self.key_field))
            .collect();

        let mut roots = Vec::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, row) in source.rows().iter().enumerate() {
            match self.field(row, &self.parent_field) {
                Some(parent) if keys.contains(&parent) => children.entry(parent).or_default().push(index),
                _ => roots.push(index),
            }
        }

        let mut walk = Walk {
            source,
            children,
            visited: HashSet::new(),
        };
        let mut out = Vec::new();
        for root in roots {
            out.extend(self.render_node(pass, &mut walk, root, 1));
        }
        out
    }
}
