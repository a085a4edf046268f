use crate::node::{Node, NodeKind};

/// Options for HTML serialization
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    /// Put every element and text node on its own indented line
    pub pretty: bool,
    /// Indentation string
    pub indent: String,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: "  ".to_string(),
        }
    }
}

fn is_void_element(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

/// Streaming HTML writer over a fragment tree
pub struct HtmlWriter {
    options: HtmlOptions,
    depth: usize,
    buffer: String,
}

impl HtmlWriter {
    pub fn new(options: HtmlOptions) -> Self {
        Self {
            options,
            depth: 0,
            buffer: String::new(),
        }
    }

    fn add(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn add_line(&mut self, text: &str) {
        if self.options.pretty {
            self.add_indent();
        }
        self.add(text);
        if self.options.pretty {
            self.add("\n");
        }
    }

    fn add_indent(&mut self) {
        for _ in 0..self.depth {
            self.buffer.push_str(&self.options.indent);
        }
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
        }
    }

    pub fn write(&mut self, node: &Node) {
        match node.kind() {
            NodeKind::Element { tag, attributes } => {
                let mut open = format!("<{}", tag);
                for (name, value) in &attributes {
                    open.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
                }
                open.push('>');

                if is_void_element(&tag) {
                    self.add_line(&open);
                    return;
                }

                let children = node.children();
                if children.is_empty() {
                    self.add_line(&format!("{}</{}>", open, tag));
                    return;
                }

                self.add_line(&open);
                self.indent();
                for child in &children {
                    self.write(child);
                }
                self.dedent();
                self.add_line(&format!("</{}>", tag));
            }
            NodeKind::Text(content) => {
                if self.options.pretty && content.trim().is_empty() {
                    return;
                }
                self.add_line(&escape_text(&content));
            }
            NodeKind::Comment(content) => {
                self.add_line(&format!("<!--{}-->", content));
            }
            NodeKind::Anchor(_) => {
                for child in node.children() {
                    self.write(&child);
                }
            }
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

/// Serialize a list of nodes to compact HTML
pub fn to_html(nodes: &[Node]) -> String {
    to_html_with(nodes, HtmlOptions::default())
}

pub fn to_html_with(nodes: &[Node], options: HtmlOptions) -> String {
    let mut writer = HtmlWriter::new(options);
    for node in nodes {
        writer.write(node);
    }
    writer.finish()
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_output() {
        let node = Node::element("ul")
            .with_attr("class", "rows")
            .with_child(Node::element("li").with_child(Node::text("a & b")))
            .with_child(Node::element("br"));

        assert_eq!(
            to_html(&[node]),
            "<ul class=\"rows\"><li>a &amp; b</li><br></ul>"
        );
    }

    #[test]
    fn test_anchor_is_transparent() {
        let anchor = Node::anchor("child").with_child(Node::text("inner"));
        let node = Node::element("div").with_child(anchor);
        assert_eq!(to_html(&[node]), "<div>inner</div>");
    }

    #[test]
    fn test_pretty_output() {
        let node = Node::element("div").with_child(Node::element("span").with_child(Node::text("x")));
        let html = to_html_with(
            &[node],
            HtmlOptions {
                pretty: true,
                indent: "  ".to_string(),
            },
        );
        assert_eq!(html, "<div>\n  <span>\n    x\n  </span>\n</div>\n");
    }

    #[test]
    fn test_attribute_quotes_escaped() {
        let node = Node::element("a").with_attr("title", "say \"hi\"");
        assert_eq!(to_html(&[node]), "<a title=\"say &quot;hi&quot;\"></a>");
    }
}
