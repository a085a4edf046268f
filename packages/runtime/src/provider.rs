//! Data providers: the boundary to whatever fetches rows.

use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use bindery_source::{Context, Row};
use serde_json::{Map, Value as JsonValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use tracing::warn;

/// Request parameters passed to a provider
pub type Parameters = Map<String, JsonValue>;

/// One result set per declared member
pub type ResultSets = Vec<Vec<Row>>;

/// Receives loaded result sets; returns `false` when the receiver is gone and the
/// provider should stop delivering
pub type DataCallback<'a> = &'a mut dyn FnMut(ResultSets) -> bool;

#[async_trait(?Send)]
pub trait DataProvider {
    /// Load the data for `source_id`, delivering it through `on_data` one or more times
    async fn load_data(
        &self,
        context: &Context,
        source_id: &str,
        parameters: &Parameters,
        on_data: DataCallback<'_>,
    ) -> RuntimeResult<()>;
}

/// In-memory provider serving fixed result sets
#[derive(Default)]
pub struct StaticProvider {
    fixtures: RefCell<HashMap<String, ResultSets>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, source_id: &str, result_sets: ResultSets) -> Self {
        self.insert(source_id, result_sets);
        self
    }

    pub fn insert(&self, source_id: &str, result_sets: ResultSets) {
        self.fixtures
            .borrow_mut()
            .insert(source_id.to_lowercase(), result_sets);
    }
}

#[async_trait(?Send)]
impl DataProvider for StaticProvider {
    async fn load_data(
        &self,
        _context: &Context,
        source_id: &str,
        _parameters: &Parameters,
        on_data: DataCallback<'_>,
    ) -> RuntimeResult<()> {
        let result_sets = self
            .fixtures
            .borrow()
            .get(&source_id.to_lowercase())
            .cloned()
            .ok_or_else(|| RuntimeError::Provider(format!("no data for '{}'", source_id)))?;
        on_data(result_sets);
        Ok(())
    }
}

/// Named providers available to data commands
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Rc<RefCell<HashMap<String, Rc<dyn DataProvider>>>>,
}

impl ProviderRegistry {
    pub const DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, provider: Rc<dyn DataProvider>) {
        self.providers
            .borrow_mut()
            .insert(name.to_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> RuntimeResult<Rc<dyn DataProvider>> {
        self.providers
            .borrow()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownProvider(name.to_string()))
    }
}

/// Run `op` up to `max_attempts` times, returning the first success.
///
/// Exhaustion becomes [`RuntimeError::ProviderExhausted`] carrying the last failure.
pub async fn with_retry<T, F, Fut>(max_attempts: usize, mut op: F) -> RuntimeResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = RuntimeResult<T>>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt, max_attempts = attempts, error = %err, "Provider attempt failed");
                last_error = err.to_string();
            }
        }
    }
    Err(RuntimeError::ProviderExhausted {
        attempts,
        message: last_error,
    })
}
