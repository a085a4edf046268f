use crate::command::{Arrangement, FaceCommand, Settings};
use crate::render::RenderPass;
use crate::template::attach_children;
use bindery_dom::Node;
use bindery_runtime::{RuntimeError, RuntimeResult};
use bindery_source::{display_value, Source};

/// Cache group of the per-group header rows
const OUTER_GROUP: &str = "@outer";

/// Rows grouped by the value of one column, in order of first appearance.
///
/// Each group renders an outer face (level `1`, bound to the group's first row) and
/// one inner face per member row (level `2`) placed in the outer face's `@child`
/// anchor. A group whose outer row matches no face renders its members flat.
#[derive(Debug)]
pub struct GroupedView {
    group_field: String,
}

pub type ViewCommand = FaceCommand<GroupedView>;

impl Arrangement for GroupedView {
    const KEYWORD: &'static str = "view";

    fn from_node(node: &Node) -> RuntimeResult<Self> {
        let group_field = node
            .attribute("group")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RuntimeError::missing_attribute(&node.tag().unwrap_or_default(), "group"))?;
        Ok(Self { group_field })
    }

    fn arrange(&self, pass: &mut RenderPass<'_>, source: &Source, _settings: &Settings) -> Vec<Node> {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (index, row) in source.rows().iter().enumerate() {
            let value = row.get(&self.group_field).map(display_value).unwrap_or_default();
            match groups.iter_mut().find(|(name, _)| *name == value) {
                Some((_, members)) => members.push(index),
                None => groups.push((value, vec![index])),
            }
        }

        let outer_level = ["1".to_string()];
        let inner_level = ["2".to_string()];
        let mut out = Vec::new();
        for (name, members) in groups {
            let outer = pass.render_row(OUTER_GROUP, source, members[0], &outer_level);
            let mut inner = Vec::new();
            for index in members {
                if let Some(result) = pass.render_row(&name, source, index, &inner_level) {
                    inner.extend(result.nodes().iter().cloned());
                }
            }
            match outer {
                Some(header) => out.extend(attach_children(header.nodes(), inner)),
                None => out.extend(inner),
            }
        }
        out
    }
}
