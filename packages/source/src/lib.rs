//! # Bindery Source
//!
//! The versioned data layer of the runtime.
//!
//! - [`Source`]: a named row-set with one version counter per row.
//! - [`Repository`]: the store of sources for one scope, plus subscriber handlers and
//!   one-shot waiters.
//! - [`Context`]: a scoping façade over a repository, chained to a parent context.
//!
//! ## Version Contract
//!
//! `rows.len() == versions.len()` always holds. A row replaced in place gets its
//! version incremented; a freshly appended row starts at version 0. Renderers rely on
//! this to skip rows whose `(key, version)` did not change.
//!
//! ## Ownership
//!
//! A repository owns its sources (as shared snapshots, `Rc<Source>`). A context owns
//! its repository and holds a strong link to its parent only; parents never hold
//! children, and everything that points back at a context does so through
//! [`WeakContext`].

pub mod context;
pub mod error;
pub mod logger;
pub mod options;
pub mod repository;
pub mod source;
pub mod value;

pub use context::{Context, WeakContext};
pub use error::{SourceError, SourceResult};
pub use logger::{Logger, TracingLogger};
pub use options::{BindingPatterns, Options};
pub use repository::{Repository, SourceHandler};
pub use source::{MergeType, Row, RowKey, RowStatus, Source, SourceOptions, WireSource};
pub use value::{display_value, is_empty_value};
