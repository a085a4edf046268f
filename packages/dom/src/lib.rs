//! # Bindery DOM
//!
//! A small, single-threaded fragment tree. Nodes are shared handles
//! (`Rc<RefCell<..>>`) with a weak link to their parent, so a component can hold
//! on to the node it is bound to while the tree keeps changing around it.
//!
//! Anchors are explicit placeholder nodes: renderers insert nested content into an
//! anchor instead of patching live ranges. Anchors are transparent when serialized.

pub mod html;
pub mod node;

pub use html::{to_html, to_html_with, HtmlOptions, HtmlWriter};
pub use node::{Node, NodeKind};
