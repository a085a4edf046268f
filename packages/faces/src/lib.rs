//! # Bindery Faces
//!
//! Collection-rendering commands. A command declares one or more `<face>` templates;
//! every render pass picks, for each row, the first face whose filter, row type and
//! level all match, then substitutes the row into that face's template.
//!
//! Rendered rows are cached by `(group, row key)`. A row whose version and selected
//! face are unchanged since the previous pass keeps its nodes as they are.
//!
//! | Keyword | Arrangement |
//! |---|---|
//! | `list` | [`List`]: flat rows, optional dividers and padding |
//! | `tree` | [`Tree`]: rows nested by parent key |
//! | `view` | [`GroupedView`]: rows grouped by a column |

pub mod command;
pub mod face;
pub mod list;
pub mod render;
pub mod template;
pub mod tree;
pub mod view;

pub use command::{Arrangement, FaceCommand, Layout, Settings};
pub use face::{CompiledFace, Face, RowType};
pub use list::{List, ListCommand};
pub use render::{CacheKey, FaceRenderResult, RenderCache, RenderPass, RenderStats};
pub use tree::{Tree, TreeCommand};
pub use view::{GroupedView, ViewCommand};

use bindery_runtime::CommandRegistry;

/// Register the `list`, `tree` and `view` commands
pub fn register_commands(registry: &CommandRegistry) {
    registry.register(List::KEYWORD, ListCommand::create);
    registry.register(Tree::KEYWORD, TreeCommand::create);
    registry.register(GroupedView::KEYWORD, ViewCommand::create);
}
