use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// What a node is, independent of where it sits in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// HTML element with ordered attributes
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },

    /// Text node
    Text(String),

    /// Comment node
    Comment(String),

    /// Named insertion point for nested content (serialized transparently)
    Anchor(String),
}

struct NodeData {
    kind: NodeKind,
    children: Vec<Node>,
    parent: Weak<RefCell<NodeData>>,
}

/// Shared handle to a node in a fragment tree
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Node(Rc::new(RefCell::new(NodeData {
            kind,
            children: Vec::new(),
            parent: Weak::new(),
        })))
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(content.into()))
    }

    pub fn comment(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Comment(content.into()))
    }

    pub fn anchor(name: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Anchor(name.into()))
    }

    pub fn with_attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(&name.into(), value);
        self
    }

    pub fn with_child(self, child: Node) -> Self {
        self.append_child(&child);
        self
    }

    pub fn with_children(self, children: impl IntoIterator<Item = Node>) -> Self {
        for child in children {
            self.append_child(&child);
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.0.borrow().kind.clone()
    }

    pub fn tag(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Text(_))
    }

    pub fn anchor_name(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Anchor(name) => Some(name.clone()),
            _ => None,
        }
    }

    /// Text of a text or comment node
    pub fn text_content(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Replace the text of a text or comment node. Ignored for other kinds.
    pub fn set_text(&self, content: impl Into<String>) {
        match &mut self.0.borrow_mut().kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => *s = content.into(),
            _ => {}
        }
    }

    /// Attribute lookup, case-insensitive on the name
    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn attributes(&self) -> Vec<(String, String)> {
        match &self.0.borrow().kind {
            NodeKind::Element { attributes, .. } => attributes.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attributes, .. } = &mut self.0.borrow_mut().kind {
            let value = value.into();
            match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.0.borrow_mut().kind {
            let index = attributes
                .iter()
                .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
            return Some(attributes.remove(index).1);
        }
        None
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    /// Append a child, moving it out of its current parent first
    pub fn append_child(&self, child: &Node) {
        child.detach();
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child.clone());
    }

    /// Insert a child at `index` (clamped to the child count)
    pub fn insert_child(&self, index: usize, child: &Node) {
        child.detach();
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        let mut data = self.0.borrow_mut();
        let index = index.min(data.children.len());
        data.children.insert(index, child.clone());
    }

    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut data = self.0.borrow_mut();
            match data.children.iter().position(|c| c.ptr_eq(child)) {
                Some(index) => {
                    data.children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            child.0.borrow_mut().parent = Weak::new();
        }
        removed
    }

    /// Remove this node from its parent, if it has one
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Remove and return all children
    pub fn take_children(&self) -> Vec<Node> {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in &children {
            child.0.borrow_mut().parent = Weak::new();
        }
        children
    }

    pub fn replace_children(&self, children: impl IntoIterator<Item = Node>) {
        self.take_children();
        for child in children {
            self.append_child(&child);
        }
    }

    /// Copy this node and its whole subtree into a new, parentless tree
    pub fn deep_clone(&self) -> Node {
        let copy = Node::from_kind(self.kind());
        for child in self.children() {
            copy.append_child(&child.deep_clone());
        }
        copy
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Depth-first search for the first anchor with the given name
    pub fn find_anchor(&self, name: &str) -> Option<Node> {
        self.find(&|node: &Node| node.anchor_name().as_deref() == Some(name))
    }

    /// Depth-first search (this node included)
    pub fn find(&self, predicate: &dyn Fn(&Node) -> bool) -> Option<Node> {
        if predicate(self) {
            return Some(self.clone());
        }
        self.children()
            .iter()
            .find_map(|child| child.find(predicate))
    }

    /// All elements with the given tag in this subtree, in document order
    pub fn elements_by_tag(&self, tag: &str) -> Vec<Node> {
        let mut found = Vec::new();
        self.collect_by_tag(tag, &mut found);
        found
    }

    fn collect_by_tag(&self, tag: &str, found: &mut Vec<Node>) {
        if self.tag().is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
            found.push(self.clone());
        }
        for child in self.children() {
            child.collect_by_tag(tag, found);
        }
    }

    /// Concatenated text of every text node in the subtree
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let NodeKind::Text(s) = &self.0.borrow().kind {
            out.push_str(s);
        }
        for child in self.children() {
            child.collect_text(out);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Node")
            .field("kind", &data.kind)
            .field("children", &data.children)
            .finish()
    }
}
