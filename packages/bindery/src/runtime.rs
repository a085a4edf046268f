use anyhow::Context as _;
use bindery_dom::Node;
use bindery_faces::register_commands;
use bindery_runtime::{
    CommandRegistry, ComponentCollection, DataProvider, Dispatcher, ProviderRegistry,
    RuntimeResult, SourceCommand,
};
use bindery_source::{Context, Options, Source};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `BINDERY_LOG=bindery_faces=debug`
pub const LOG_ENV: &str = "BINDERY_LOG";

/// Registry with the built-in commands: `list`, `tree`, `view` and `source`
pub fn default_registry(providers: &ProviderRegistry) -> CommandRegistry {
    let registry = CommandRegistry::new();
    register_commands(&registry);
    registry.register("source", SourceCommand::factory(providers.clone()));
    registry
}

/// One root context with the fragments mounted into it
pub struct Runtime {
    context: Context,
    registry: CommandRegistry,
    providers: ProviderRegistry,
    dispatcher: Dispatcher,
    mounts: RefCell<Vec<ComponentCollection>>,
}

impl Runtime {
    pub fn new(options: Options) -> RuntimeResult<Self> {
        let context = Context::new(options)?;
        let providers = ProviderRegistry::new();
        Ok(Self {
            context,
            registry: default_registry(&providers),
            providers,
            dispatcher: Dispatcher::new(),
            mounts: RefCell::new(Vec::new()),
        })
    }

    /// Build from a persisted options file; a missing file means default options
    pub fn from_config_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let options = Options::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?;
        let runtime = Self::new(options).context("Failed to create runtime")?;
        info!(path = %path.display(), "Runtime configured");
        Ok(runtime)
    }

    /// Install a fmt subscriber filtered by [`LOG_ENV`] (default `warn`).
    ///
    /// Does nothing if a global subscriber is already set.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn register_provider(&self, name: &str, provider: Rc<dyn DataProvider>) {
        self.providers.register(name, provider);
    }

    /// Extract and run the components of `roots`.
    ///
    /// Every mount is its own collection; all share this runtime's context.
    pub async fn mount(&self, roots: &[Node]) -> RuntimeResult<usize> {
        let collection = ComponentCollection::from_roots(
            roots,
            self.context.clone(),
            self.registry.clone(),
            self.dispatcher.clone(),
        )?;
        let components = collection.len();
        let result = collection.run().await;
        self.mounts.borrow_mut().push(collection);
        result?;
        debug!(components, "Fragment mounted");
        Ok(components)
    }

    pub fn set_source(&self, source: Source) -> Rc<Source> {
        self.context.set_source(source)
    }

    pub fn set_as_source(&self, id: &str, value: JsonValue) -> Rc<Source> {
        self.context.set_as_source(id, value)
    }

    pub fn try_to_get_source(&self, id: &str) -> Option<Rc<Source>> {
        self.context.try_to_get_source(id)
    }

    /// Run every queued re-render, including the ones they trigger in turn
    pub async fn settle(&self) -> RuntimeResult<()> {
        self.dispatcher.drain().await
    }

    /// Dispose every mount, stop the queue and detach the context
    pub async fn dispose(&self) {
        let mounts = std::mem::take(&mut *self.mounts.borrow_mut());
        for collection in &mounts {
            collection.dispose().await;
        }
        self.dispatcher.close();
        self.context.dispose();
        debug!(mounts = mounts.len(), "Runtime disposed");
    }
}
