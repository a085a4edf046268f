use crate::component::Component;
use crate::dispatcher::Dispatcher;
use crate::error::{RuntimeError, RuntimeResult};
use bindery_dom::Node;
use bindery_source::Context;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Everything a command factory receives
pub struct CommandSetup {
    /// The command root, carrying the command attribute
    pub node: Node,
    pub context: Context,
    /// Scope for the command's own descendants
    pub registry: CommandRegistry,
    pub dispatcher: Dispatcher,
}

pub type CommandFactory = Rc<dyn Fn(CommandSetup) -> RuntimeResult<Rc<dyn Component>>>;

#[derive(Default)]
struct RegistryInner {
    factories: RefCell<HashMap<String, CommandFactory>>,
    parent: Option<CommandRegistry>,
}

/// Keyword to command factory map; child scopes fall back to their parent
#[derive(Clone, Default)]
pub struct CommandRegistry {
    inner: Rc<RegistryInner>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations made on the scope stay local to it
    pub fn create_scope(&self) -> CommandRegistry {
        CommandRegistry {
            inner: Rc::new(RegistryInner {
                factories: RefCell::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn register<F>(&self, keyword: &str, factory: F)
    where
        F: Fn(CommandSetup) -> RuntimeResult<Rc<dyn Component>> + 'static,
    {
        self.inner
            .factories
            .borrow_mut()
            .insert(keyword.to_lowercase(), Rc::new(factory));
    }

    pub fn resolve(&self, keyword: &str) -> Option<CommandFactory> {
        let local = self
            .inner
            .factories
            .borrow()
            .get(&keyword.to_lowercase())
            .cloned();
        local.or_else(|| {
            self.inner
                .parent
                .as_ref()
                .and_then(|parent| parent.resolve(keyword))
        })
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.resolve(keyword).is_some()
    }

    pub fn keywords(&self) -> Vec<String> {
        let mut keywords = self
            .inner
            .parent
            .as_ref()
            .map(CommandRegistry::keywords)
            .unwrap_or_default();
        keywords.extend(self.inner.factories.borrow().keys().cloned());
        keywords.sort();
        keywords.dedup();
        keywords
    }

    pub fn create(&self, keyword: &str, setup: CommandSetup) -> RuntimeResult<Rc<dyn Component>> {
        let factory = self
            .resolve(keyword)
            .ok_or_else(|| RuntimeError::UnknownCommand(keyword.to_string()))?;
        factory(setup)
    }
}
