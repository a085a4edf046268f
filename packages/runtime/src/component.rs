//! Component lifecycle.
//!
//! ```text
//! constructed -> initializing -> idle <-> rendering -> disposed
//! ```
//!
//! A component registers triggers during `initialize`; each trigger is a source
//! handler that enqueues an [`on_trigger`] job on the [`Dispatcher`]. While a render
//! is in flight, further triggers are dropped unless the component opts into
//! concurrent processing.

use crate::dispatcher::Dispatcher;
use crate::error::RuntimeResult;
use async_trait::async_trait;
use bindery_dom::Node;
use bindery_source::{Context, Source, SourceHandler, WeakContext};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Run-phase ordering class. `None` components only render on triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
    None,
}

impl Priority {
    /// Classes that run automatically, in order
    pub const RUN_ORDER: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            "none" => Some(Priority::None),
            _ => None,
        }
    }
}

#[async_trait(?Send)]
pub trait Component {
    fn core(&self) -> &ComponentCore;

    /// Register triggers and prepare. Runs before any component renders.
    async fn initialize(&self) -> RuntimeResult<()> {
        Ok(())
    }

    /// Render; `source` is the snapshot that triggered it, `None` for the run phase
    async fn render(&self, source: Option<Rc<Source>>) -> RuntimeResult<()>;

    fn allow_multi_process(&self) -> bool {
        false
    }

    /// Detach triggers and release owned children; idempotent
    async fn dispose(&self) {
        self.core().dispose();
    }
}

/// State shared by every component
pub struct ComponentCore {
    node: Node,
    context: WeakContext,
    priority: Priority,
    dispatcher: Dispatcher,
    in_flight: Cell<usize>,
    disposed: Cell<bool>,
    triggers: RefCell<HashMap<String, SourceHandler>>,
    this: RefCell<Option<Weak<dyn Component>>>,
}

impl ComponentCore {
    pub fn new(node: Node, context: &Context, priority: Priority, dispatcher: &Dispatcher) -> Self {
        Self {
            node,
            context: context.downgrade(),
            priority,
            dispatcher: dispatcher.clone(),
            in_flight: Cell::new(0),
            disposed: Cell::new(false),
            triggers: RefCell::new(HashMap::new()),
            this: RefCell::new(None),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn context(&self) -> Option<Context> {
        self.context.upgrade()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.get() > 0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn trigger_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.triggers.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Record the owning `Rc` so triggers can reach the component
    pub fn bind(&self, this: Weak<dyn Component>) {
        *self.this.borrow_mut() = Some(this);
    }

    /// Subscribe to each source id once; sets enqueue an [`on_trigger`] job.
    ///
    /// Returns the number of newly registered ids.
    pub fn add_trigger<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(context) = self.context() else {
            return 0;
        };
        if self.is_disposed() {
            return 0;
        }

        let mut added = 0;
        for id in ids {
            let id = id.as_ref().to_lowercase();
            if self.triggers.borrow().contains_key(&id) {
                continue;
            }
            let this = self.this.borrow().clone();
            let dispatcher = self.dispatcher.clone();
            let handler: SourceHandler = Rc::new(move |source: &Rc<Source>| {
                let Some(component) = this.as_ref().and_then(Weak::upgrade) else {
                    return;
                };
                let source = source.clone();
                dispatcher.enqueue(async move { on_trigger(&component, Some(source)).await });
            });
            context.add_source_handler(&id, &handler);
            self.triggers.borrow_mut().insert(id, handler);
            added += 1;
        }
        added
    }

    /// Remove every trigger handler, then mark disposed
    pub fn dispose(&self) {
        if self.disposed.get() {
            return;
        }
        let triggers: Vec<(String, SourceHandler)> = self.triggers.borrow_mut().drain().collect();
        if let Some(context) = self.context() {
            for (id, handler) in &triggers {
                context.remove_source_handler(id, handler);
            }
        }
        self.disposed.set(true);
        debug!(triggers = triggers.len(), "Component disposed");
    }
}

struct BusyGuard<'a> {
    in_flight: &'a Cell<usize>,
}

impl<'a> BusyGuard<'a> {
    fn enter(core: &'a ComponentCore) -> Self {
        core.in_flight.set(core.in_flight.get() + 1);
        Self {
            in_flight: &core.in_flight,
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
    }
}

/// Render `component` unless it is disposed or already busy.
///
/// The busy flag is cleared even when the render fails or its future is dropped.
pub async fn on_trigger(
    component: &Rc<dyn Component>,
    source: Option<Rc<Source>>,
) -> RuntimeResult<()> {
    let core = component.core();
    if core.is_disposed() {
        return Ok(());
    }
    if core.is_busy() && !component.allow_multi_process() {
        trace!(
            source = source.as_ref().map(|s| s.id()).unwrap_or_default(),
            "Component busy, trigger dropped"
        );
        return Ok(());
    }
    let _guard = BusyGuard::enter(core);
    component.render(source).await
}

/// Bind a freshly built component to its own `Rc`
pub fn into_component<C: Component + 'static>(component: C) -> Rc<dyn Component> {
    let component: Rc<dyn Component> = Rc::new(component);
    bind(&component);
    component
}

pub fn bind(component: &Rc<dyn Component>) {
    component.core().bind(Rc::downgrade(component));
}
