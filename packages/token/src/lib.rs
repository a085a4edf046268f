//! # Bindery Token
//!
//! Compiles raw binding text into [`Token`]s.
//!
//! Binding text is scanned with two patterns taken from the context options: a
//! short object-path form (`[##db.users.name|(anonymous)##]` by default) and a
//! code-block form (`{## len(db.users.name) > 0 ##}` by default). Literal text between
//! matches becomes value tokens.
//!
//! Every token reports the source ids it depends on through
//! [`Token::source_names`] without being evaluated, which is what components use to
//! register their triggers.
//!
//! ## Waiting
//!
//! Evaluation takes an explicit `wait` flag. With `wait = true`, the last fallback
//! of an object token (and every source a code block references) suspends until the
//! source is set, unless the source lives in a reserved in-memory namespace. With
//! `wait = false` a missing source simply yields no value.

pub mod error;
pub mod expr;
pub mod lexer;
pub mod path;
pub mod scanner;
pub mod token;

pub use error::{TokenError, TokenResult};
pub use expr::{evaluate, parse_expression, Expr, Resolver, RowScope, SourceScope};
pub use path::{Alternative, ColumnPath, ObjectPath};
pub use scanner::{compile, compile_as};
pub use token::{ArrayToken, CodeBlockToken, ObjectToken, Token, ValueKind};
