use crate::error::{SourceError, SourceResult};
use crate::source::Source;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace};

/// Subscriber callback invoked synchronously after a source is set.
///
/// Handlers are compared by pointer identity, so registering the same `Rc` twice is a
/// no-op.
pub type SourceHandler = Rc<dyn Fn(&Rc<Source>)>;

#[derive(Default)]
struct RepositoryInner {
    sources: HashMap<String, Rc<Source>>,
    handlers: HashMap<String, Vec<SourceHandler>>,
    waiters: HashMap<String, Vec<oneshot::Sender<Rc<Source>>>>,
}

/// Store of sources, subscribers and waiters for one scope
#[derive(Default)]
pub struct Repository {
    inner: RefCell<RepositoryInner>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `source` into the store, notify subscribers, then resolve waiters.
    ///
    /// Returns the stored snapshot after the merge.
    #[instrument(skip(self, source), fields(source = %source.id(), rows = source.len()))]
    pub fn set_source(&self, source: Source) -> Rc<Source> {
        let stored = {
            let mut inner = self.inner.borrow_mut();
            match inner.sources.get_mut(source.id()) {
                Some(existing) => {
                    Rc::make_mut(existing).merge(source);
                    existing.clone()
                }
                None => {
                    let stored = Rc::new(source);
                    inner.sources.insert(stored.id().to_string(), stored.clone());
                    stored
                }
            }
        };
        debug!(rows = stored.len(), "Source merged");
        self.broadcast(&stored);
        stored
    }

    /// Store an already-merged snapshot as-is (used when a parent scope forwards its
    /// own snapshot), then notify and resolve waiters
    pub fn put_snapshot(&self, source: Rc<Source>) {
        self.inner
            .borrow_mut()
            .sources
            .insert(source.id().to_string(), source.clone());
        self.broadcast(&source);
    }

    fn broadcast(&self, source: &Rc<Source>) {
        let id = source.id();
        let (handlers, waiters) = {
            let mut inner = self.inner.borrow_mut();
            let handlers = inner.handlers.get(id).cloned().unwrap_or_default();
            let waiters = inner.waiters.remove(id).unwrap_or_default();
            (handlers, waiters)
        };

        trace!(source = %id, handlers = handlers.len(), waiters = waiters.len(), "Broadcasting source");
        for handler in handlers {
            handler(source);
        }
        for waiter in waiters {
            let _ = waiter.send(source.clone());
        }
    }

    pub fn try_to_get(&self, id: &str) -> Option<Rc<Source>> {
        self.inner.borrow().sources.get(&id.to_lowercase()).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.borrow().sources.contains_key(&id.to_lowercase())
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.borrow().sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve with the next snapshot set under `id`
    pub fn wait_to_get(&self, id: &str) -> impl Future<Output = SourceResult<Rc<Source>>> {
        let id = id.to_lowercase();
        let (tx, rx) = oneshot::channel();
        self.inner
            .borrow_mut()
            .waiters
            .entry(id.clone())
            .or_default()
            .push(tx);
        debug!(source = %id, "Waiting for source");
        async move { rx.await.map_err(|_| SourceError::WaitCancelled(id)) }
    }

    /// Register a handler; returns false when it was already registered for this id
    pub fn add_handler(&self, id: &str, handler: &SourceHandler) -> bool {
        let mut inner = self.inner.borrow_mut();
        let handlers = inner.handlers.entry(id.to_lowercase()).or_default();
        if handlers.iter().any(|h| Rc::ptr_eq(h, handler)) {
            return false;
        }
        handlers.push(handler.clone());
        true
    }

    pub fn remove_handler(&self, id: &str, handler: &SourceHandler) -> bool {
        let mut inner = self.inner.borrow_mut();
        let id = id.to_lowercase();
        let Some(handlers) = inner.handlers.get_mut(&id) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| !Rc::ptr_eq(h, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            inner.handlers.remove(&id);
        }
        removed
    }

    pub fn handler_count(&self, id: &str) -> usize {
        self.inner
            .borrow()
            .handlers
            .get(&id.to_lowercase())
            .map_or(0, Vec::len)
    }

    pub fn waiter_count(&self, id: &str) -> usize {
        self.inner
            .borrow()
            .waiters
            .get(&id.to_lowercase())
            .map_or(0, Vec::len)
    }

    /// Drop every subscriber and pending waiter; sources stay
    pub fn clear_handlers(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.handlers.clear();
        inner.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MergeType, Row, SourceOptions};
    use serde_json::json;
    use std::cell::Cell;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_replace_twice_scenario() {
        let repo = Repository::new();
        let options = SourceOptions {
            merge_type: MergeType::Replace,
            ..Default::default()
        };
        repo.set_source(Source::with_options("a.b", vec![row(json!({"x": 1}))], options.clone()));
        let result = repo.set_source(Source::with_options("a.b", vec![row(json!({"x": 2}))], options));

        assert_eq!(result.rows(), &[row(json!({"x": 2}))]);
        assert_eq!(result.versions(), &[1]);
        assert_eq!(repo.try_to_get("A.B").unwrap().versions(), &[1]);
    }

    #[test]
    fn test_snapshots_are_not_mutated() {
        let repo = Repository::new();
        let first = repo.set_source(Source::new("a.b", vec![row(json!({"x": 1}))]));
        let second = repo.set_source(Source::new("a.b", vec![row(json!({"x": 2}))]));

        assert_eq!(first.rows()[0]["x"], json!(1));
        assert_eq!(second.rows()[0]["x"], json!(2));
    }

    #[test]
    fn test_handlers_are_idempotent_and_notified() {
        let repo = Repository::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let handler: SourceHandler = Rc::new(move |_: &Rc<Source>| counter.set(counter.get() + 1));

        assert!(repo.add_handler("A.B", &handler));
        assert!(!repo.add_handler("a.b", &handler));
        assert_eq!(repo.handler_count("a.b"), 1);

        repo.set_source(Source::new("a.b", vec![]));
        assert_eq!(calls.get(), 1);

        assert!(repo.remove_handler("a.b", &handler));
        assert!(!repo.remove_handler("a.b", &handler));
        repo.set_source(Source::new("a.b", vec![]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_handler_may_reenter_repository() {
        let repo = Rc::new(Repository::new());
        let inner = repo.clone();
        let handler: SourceHandler = Rc::new(move |source: &Rc<Source>| {
            if source.id() == "a.b" {
                inner.set_source(Source::new("a.c", vec![]));
            }
        });
        repo.add_handler("a.b", &handler);
        repo.set_source(Source::new("a.b", vec![]));
        assert!(repo.contains("a.c"));
    }

    #[tokio::test]
    async fn test_waiters_resolve_once() {
        let repo = Repository::new();
        let first = repo.wait_to_get("a.b");
        let second = repo.wait_to_get("A.B");

        repo.set_source(Source::new("a.b", vec![row(json!({"x": 5}))]));

        assert_eq!(first.await.unwrap().rows()[0]["x"], json!(5));
        assert_eq!(second.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cleared_waiter_is_cancelled() {
        let repo = Repository::new();
        let waiting = repo.wait_to_get("a.b");
        repo.clear_handlers();
        assert!(matches!(waiting.await, Err(SourceError::WaitCancelled(_))));
    }
}
