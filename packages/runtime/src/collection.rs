//! Extraction and priority-ordered execution of the components in a fragment.

use crate::binding::{AttributeBinding, TextBinding};
use crate::component::{bind, on_trigger, Component, Priority};
use crate::dispatcher::Dispatcher;
use crate::error::{RuntimeError, RuntimeResult};
use crate::passthrough::Passthrough;
use crate::registry::{CommandRegistry, CommandSetup};
use bindery_dom::{Node, NodeKind};
use bindery_source::Context;
use futures::future::join_all;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    Ready,
    Running,
    Ran,
    Disposed,
}

/// The components found in a set of root nodes
pub struct ComponentCollection {
    context: Context,
    registry: CommandRegistry,
    dispatcher: Dispatcher,
    components: RefCell<Vec<Rc<dyn Component>>>,
    state: Cell<CollectionState>,
}

impl ComponentCollection {
    pub fn new(context: Context, registry: CommandRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            context,
            registry,
            dispatcher,
            components: RefCell::new(Vec::new()),
            state: Cell::new(CollectionState::Ready),
        }
    }

    /// Build a collection and extract `roots` in one step
    pub fn from_roots(
        roots: &[Node],
        context: Context,
        registry: CommandRegistry,
        dispatcher: Dispatcher,
    ) -> RuntimeResult<Self> {
        let collection = Self::new(context, registry, dispatcher);
        collection.extract(roots)?;
        Ok(collection)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn components(&self) -> Vec<Rc<dyn Component>> {
        self.components.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.components.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.borrow().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == CollectionState::Disposed
    }

    /// Walk `roots` and create one component per binding, command or wrapper tag.
    ///
    /// Command nodes own their subtree, so the walk does not descend into them.
    /// Returns the number of components added.
    pub fn extract(&self, roots: &[Node]) -> RuntimeResult<usize> {
        let mut found = Vec::new();
        for root in roots {
            self.extract_node(root, &mut found)?;
        }
        let added = found.len();
        for component in &found {
            bind(component);
        }
        self.components.borrow_mut().extend(found);
        Ok(added)
    }

    fn extract_node(&self, node: &Node, found: &mut Vec<Rc<dyn Component>>) -> RuntimeResult<()> {
        let patterns = self.context.patterns();
        let options = self.context.options();
        match node.kind() {
            NodeKind::Text(text) => {
                if patterns.is_binding(&text) {
                    found.push(TextBinding::create(node.clone(), &self.context, &self.dispatcher)?);
                }
            }
            NodeKind::Element { tag, attributes } => {
                let command = attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&options.command_attribute))
                    .map(|(_, value)| value.trim().to_string());
                if let Some(keyword) = command {
                    debug!(command = %keyword, tag = %tag, "Extracting command");
                    let setup = CommandSetup {
                        node: node.clone(),
                        context: self.context.clone(),
                        registry: self.registry.create_scope(),
                        dispatcher: self.dispatcher.clone(),
                    };
                    found.push(self.registry.create(&keyword, setup)?);
                    return Ok(());
                }

                for (name, value) in &attributes {
                    if patterns.is_binding(value) {
                        found.push(AttributeBinding::create(
                            node.clone(),
                            name,
                            &self.context,
                            &self.dispatcher,
                        )?);
                    }
                }
                if options
                    .passthrough_tags
                    .iter()
                    .any(|passthrough| passthrough.eq_ignore_ascii_case(&tag))
                {
                    found.push(Passthrough::create(node.clone(), &self.context, &self.dispatcher));
                }
                for child in node.children() {
                    self.extract_node(&child, found)?;
                }
            }
            NodeKind::Comment(_) | NodeKind::Anchor(_) => {}
        }
        Ok(())
    }

    /// Initialize every component, then render them class by class.
    ///
    /// No render starts before all initializations have settled. A collection runs
    /// at most once.
    #[instrument(skip(self), fields(components = self.len()))]
    pub async fn run(&self) -> RuntimeResult<()> {
        match self.state.get() {
            CollectionState::Ready => {}
            CollectionState::Disposed => return Err(RuntimeError::Disposed),
            CollectionState::Running | CollectionState::Ran => return Err(RuntimeError::AlreadyRun),
        }
        self.state.set(CollectionState::Running);

        let components = self.components();
        let mut first_error = None;

        let initialized = join_all(components.iter().map(|component| component.initialize())).await;
        for result in initialized {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        debug!("Initialization barrier passed");

        for class in Priority::RUN_ORDER {
            if self.state.get() == CollectionState::Disposed {
                break;
            }
            let batch: Vec<_> = components
                .iter()
                .filter(|component| component.core().priority() == class)
                .collect();
            if batch.is_empty() {
                continue;
            }
            debug!(priority = ?class, components = batch.len(), "Running priority class");
            let rendered = join_all(batch.into_iter().map(|component| on_trigger(component, None))).await;
            for result in rendered {
                if let Err(err) = result {
                    first_error.get_or_insert(err);
                }
            }
        }

        if self.state.get() == CollectionState::Running {
            self.state.set(CollectionState::Ran);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Dispose every component; the collection cannot run afterwards
    pub async fn dispose(&self) {
        if self.state.replace(CollectionState::Disposed) == CollectionState::Disposed {
            return;
        }
        let components = std::mem::take(&mut *self.components.borrow_mut());
        join_all(components.iter().map(|component| component.dispose())).await;
        debug!(components = components.len(), "Collection disposed");
    }
}
