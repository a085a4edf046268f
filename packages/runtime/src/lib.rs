//! # Bindery Runtime
//!
//! Turns a fragment into live components.
//!
//! A [`ComponentCollection`] walks root nodes once and creates:
//!
//! - a [`TextBinding`] for each text node containing a binding,
//! - an [`AttributeBinding`] for each bound attribute,
//! - a command component for each element carrying the command attribute
//!   (`core="list"` by default), built by the [`CommandRegistry`],
//! - a [`Passthrough`] for recognized wrapper tags.
//!
//! Running the collection initializes every component, waits for all of them, then
//! renders the `High`, `Normal` and `Low` classes in turn. After that, components
//! re-render when the sources they registered as triggers are set; the resulting
//! work is queued on the [`Dispatcher`] and driven by the host.

pub mod binding;
pub mod collection;
pub mod component;
pub mod data_command;
pub mod dispatcher;
pub mod error;
pub mod passthrough;
pub mod provider;
pub mod registry;

pub use binding::{AttributeBinding, TextBinding};
pub use collection::ComponentCollection;
pub use component::{bind, into_component, on_trigger, Component, ComponentCore, Priority};
pub use data_command::SourceCommand;
pub use dispatcher::Dispatcher;
pub use error::{RuntimeError, RuntimeResult};
pub use passthrough::Passthrough;
pub use provider::{
    with_retry, DataCallback, DataProvider, Parameters, ProviderRegistry, ResultSets,
    StaticProvider,
};
pub use registry::{CommandFactory, CommandRegistry, CommandSetup};
