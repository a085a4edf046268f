//! Row substitution into template fragments.

use bindery_dom::{Node, NodeKind};
use bindery_source::{display_value, Row};
use regex::{Captures, Regex};

/// Name of the anchor nested content is inserted at
pub const CHILD_ANCHOR: &str = "child";

/// Detach `node`'s children for use as a template.
///
/// Text nodes consisting only of `@child` become [`CHILD_ANCHOR`] anchors.
pub fn take_template(node: &Node) -> Vec<Node> {
    let children = node.take_children();
    for child in &children {
        mark_anchors(child);
    }
    children
        .into_iter()
        .map(|child| anchor_for(&child).unwrap_or(child))
        .collect()
}

fn anchor_for(node: &Node) -> Option<Node> {
    let text = node.text_content()?;
    (text.trim() == format!("@{}", CHILD_ANCHOR)).then(|| Node::anchor(CHILD_ANCHOR))
}

fn mark_anchors(node: &Node) {
    for (index, child) in node.children().into_iter().enumerate() {
        match anchor_for(&child) {
            Some(anchor) => {
                node.remove_child(&child);
                node.insert_child(index, &anchor);
            }
            None => mark_anchors(&child),
        }
    }
}

/// Deep-copy `template` with every row-pattern match replaced by the row's column.
///
/// Matches naming a column the row does not have are left as written.
pub fn substitute(template: &[Node], row: &Row, pattern: &Regex) -> Vec<Node> {
    template
        .iter()
        .map(|node| {
            let copy = node.deep_clone();
            substitute_node(&copy, row, pattern);
            copy
        })
        .collect()
}

fn substitute_node(node: &Node, row: &Row, pattern: &Regex) {
    match node.kind() {
        NodeKind::Text(text) => {
            if pattern.is_match(&text) {
                node.set_text(replace(&text, row, pattern));
            }
        }
        NodeKind::Element { attributes, .. } => {
            for (name, value) in attributes {
                if pattern.is_match(&value) {
                    node.set_attribute(&name, replace(&value, row, pattern));
                }
            }
            for child in node.children() {
                substitute_node(&child, row, pattern);
            }
        }
        NodeKind::Anchor(_) => {
            for child in node.children() {
                substitute_node(&child, row, pattern);
            }
        }
        NodeKind::Comment(_) => {}
    }
}

fn replace(text: &str, row: &Row, pattern: &Regex) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let column = caps.get(1).map_or("", |m| m.as_str());
            match row.get(column) {
                Some(value) => display_value(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Deep copies of a template, without substitution
pub fn clone_all(template: &[Node]) -> Vec<Node> {
    template.iter().map(Node::deep_clone).collect()
}

/// Put `children` into the first [`CHILD_ANCHOR`] of `nodes`, or after `nodes` when
/// there is none
pub fn attach_children(nodes: &[Node], children: Vec<Node>) -> Vec<Node> {
    let anchor = nodes.iter().find_map(|node| node.find_anchor(CHILD_ANCHOR));
    match anchor {
        Some(anchor) => {
            anchor.take_children();
            for child in &children {
                anchor.append_child(child);
            }
            nodes.to_vec()
        }
        None => {
            let mut out = nodes.to_vec();
            out.extend(children);
            out
        }
    }
}
