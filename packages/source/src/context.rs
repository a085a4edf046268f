use crate::error::{SourceError, SourceResult};
use crate::logger::{Logger, TracingLogger};
use crate::options::{BindingPatterns, Options};
use crate::repository::{Repository, SourceHandler};
use crate::source::Source;
use serde_json::Value as JsonValue;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::{Rc, Weak};
use tracing::debug;

struct ContextInner {
    repository: Repository,
    options: Rc<Options>,
    patterns: Rc<BindingPatterns>,
    settings: HashMap<String, JsonValue>,
    logger: Rc<dyn Logger>,
    parent: Option<Context>,
    /// Handlers this context registered on its parent, per source id
    bridges: RefCell<HashMap<String, SourceHandler>>,
    /// Ids whose local copy was forwarded from the parent rather than set here
    inherited: RefCell<HashSet<String>>,
    disposed: Cell<bool>,
}

/// Scoped façade over a repository, chained to an optional parent
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

/// Non-owning handle to a context
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl Context {
    /// Root context with the default `tracing` logger
    pub fn new(options: Options) -> SourceResult<Self> {
        Self::with_logger(options, Rc::new(TracingLogger))
    }

    pub fn with_logger(options: Options, logger: Rc<dyn Logger>) -> SourceResult<Self> {
        let patterns = BindingPatterns::compile(&options)?;
        let settings = options.settings.clone();
        Ok(Self {
            inner: Rc::new(ContextInner {
                repository: Repository::new(),
                options: Rc::new(options),
                patterns: Rc::new(patterns),
                settings,
                logger,
                parent: None,
                bridges: RefCell::new(HashMap::new()),
                inherited: RefCell::new(HashSet::new()),
                disposed: Cell::new(false),
            }),
        })
    }

    /// Child scope sharing options, patterns and logger with this one
    pub fn create_child(&self) -> Context {
        self.create_child_with_settings(HashMap::new())
    }

    /// Child scope whose settings shadow the parent's
    pub fn create_child_with_settings(&self, settings: HashMap<String, JsonValue>) -> Context {
        Context {
            inner: Rc::new(ContextInner {
                repository: Repository::new(),
                options: self.inner.options.clone(),
                patterns: self.inner.patterns.clone(),
                settings,
                logger: self.inner.logger.clone(),
                parent: Some(self.clone()),
                bridges: RefCell::new(HashMap::new()),
                inherited: RefCell::new(HashSet::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn patterns(&self) -> &BindingPatterns {
        &self.inner.patterns
    }

    pub fn logger(&self) -> &dyn Logger {
        self.inner.logger.as_ref()
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repository
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_reserved(&self, source_id: &str) -> bool {
        self.inner.options.is_reserved(source_id)
    }

    /// Setting lookup, local first then parent
    pub fn option(&self, key: &str) -> Option<JsonValue> {
        self.inner
            .settings
            .get(key)
            .cloned()
            .or_else(|| self.parent().and_then(|parent| parent.option(key)))
    }

    /// Local repository first, then the parent chain
    pub fn try_to_get_source(&self, id: &str) -> Option<Rc<Source>> {
        self.inner
            .repository
            .try_to_get(id)
            .or_else(|| self.parent().and_then(|parent| parent.try_to_get_source(id)))
    }

    /// Store a source in this scope and broadcast it locally
    pub fn set_source(&self, source: Source) -> Rc<Source> {
        self.set_source_with_preview(source, false)
    }

    /// Like [`Context::set_source`]; a preview set is logged through the logger first
    pub fn set_source_with_preview(&self, source: Source, preview: bool) -> Rc<Source> {
        if preview {
            self.inner.logger.log_source(&source);
        }
        self.inner.inherited.borrow_mut().remove(source.id());
        self.inner.repository.set_source(source)
    }

    /// Wrap an arbitrary JSON value as a source and set it
    pub fn set_as_source(&self, id: &str, value: JsonValue) -> Rc<Source> {
        self.set_source(Source::from_value(id, value))
    }

    /// Receive a parent's broadcast into the local cache without touching the parent.
    ///
    /// A source set directly in this scope shadows the parent's and is left alone.
    pub fn set_source_from_owner(&self, source: Rc<Source>) {
        let id = source.id().to_string();
        let shadowed =
            self.inner.repository.contains(&id) && !self.inner.inherited.borrow().contains(&id);
        if shadowed {
            debug!(source = %id, "Owner source shadowed locally, ignoring");
            return;
        }
        self.inner.inherited.borrow_mut().insert(id);
        self.inner.repository.put_snapshot(source);
    }

    /// Register a handler for `id` in this scope.
    ///
    /// Sets made in parent scopes reach the handler through a bridge registered once
    /// per id on the parent.
    pub fn add_source_handler(&self, id: &str, handler: &SourceHandler) -> bool {
        let added = self.inner.repository.add_handler(id, handler);
        self.ensure_bridge(id);
        added
    }

    pub fn remove_source_handler(&self, id: &str, handler: &SourceHandler) -> bool {
        self.inner.repository.remove_handler(id, handler)
    }

    /// Resolve with the next snapshot of `id` set in this scope or forwarded from a
    /// parent
    pub fn wait_to_get_source(&self, id: &str) -> impl Future<Output = SourceResult<Rc<Source>>> {
        // a disposed scope never registers a waiter
        let waiting = (!self.is_disposed()).then(|| {
            let waiting = self.inner.repository.wait_to_get(id);
            self.ensure_bridge(id);
            waiting
        });
        async move {
            match waiting {
                Some(waiting) => waiting.await,
                None => Err(SourceError::Disposed),
            }
        }
    }

    fn ensure_bridge(&self, id: &str) {
        let Some(parent) = self.parent() else {
            return;
        };
        let id = id.to_lowercase();
        if self.inner.bridges.borrow().contains_key(&id) {
            return;
        }

        let weak = self.downgrade();
        let bridge: SourceHandler = Rc::new(move |source: &Rc<Source>| {
            if let Some(child) = weak.upgrade() {
                child.set_source_from_owner(source.clone());
            }
        });
        parent.add_source_handler(&id, &bridge);
        self.inner.bridges.borrow_mut().insert(id, bridge);
    }

    /// Detach this scope: bridges on the parent and local subscribers are removed.
    ///
    /// Sources stay readable; idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let bridges: Vec<(String, SourceHandler)> =
            self.inner.bridges.borrow_mut().drain().collect();
        if let Some(parent) = self.parent() {
            for (id, bridge) in &bridges {
                parent.remove_source_handler(id, bridge);
            }
        }
        self.inner.repository.clear_handlers();
        debug!(bridges = bridges.len(), "Context disposed");
    }
}
