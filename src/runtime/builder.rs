use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::dispatch::{HookBus, PluginRegistry};
use crate::router::{
    Guard, LocationSource, MemoryLocation, RouteDefinition, RouteError, RouteTable, Router,
    RouterParts,
};
use crate::runtime::{Runtime, RuntimeError, RuntimeInner, WeakRuntime};
use crate::screen::{
    Anonymous, AuthProvider, IdentityTranslator, Screen, ScreenContext, ScreenServices, Translator,
};
use crate::state::StateStore;
use crate::storage::{MemoryStorage, Storage};
use crate::vdom::{HostNodeId, HostTree, Reconciler, VNode};

/// Collects the host, screens, routes and collaborators of a runtime.
pub struct RuntimeBuilder {
    host: Box<dyn HostTree>,
    mount: HostNodeId,
    config: RuntimeConfig,
    location: Option<Arc<dyn LocationSource>>,
    translator: Arc<dyn Translator>,
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn Storage>,
    screens: HashMap<String, Screen>,
    routes: Vec<RouteDefinition>,
    guards: Vec<Arc<dyn Guard>>,
}

impl RuntimeBuilder {
    pub fn new(host: impl HostTree + 'static, mount: HostNodeId) -> Self {
        Self {
            host: Box::new(host),
            mount,
            config: RuntimeConfig::default(),
            location: None,
            translator: Arc::new(IdentityTranslator),
            auth: Arc::new(Anonymous),
            storage: Arc::new(MemoryStorage::new()),
            screens: HashMap::new(),
            routes: Vec::new(),
            guards: Vec::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to a `MemoryLocation` at the configured root.
    pub fn location(mut self, location: impl LocationSource + 'static) -> Self {
        self.location = Some(Arc::new(location));
        self
    }

    pub fn translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    pub fn auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Register a screen under `id`. Re-registering an id replaces it.
    pub fn screen<F>(mut self, id: &str, screen: F) -> Self
    where
        F: Fn(&ScreenContext) -> anyhow::Result<VNode> + Send + Sync + 'static,
    {
        self.screens.insert(id.to_string(), Arc::new(screen));
        self
    }

    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    /// Guard run before the route guards of every navigation.
    pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let RuntimeBuilder {
            host,
            mount,
            config,
            location,
            translator,
            auth,
            storage,
            screens,
            routes,
            guards,
        } = self;

        config.validate()?;
        let routes = RouteTable::build(routes)?;
        if let Some(route) = routes.iter().find(|r| !screens.contains_key(&r.screen)) {
            return Err(RouteError::UnknownScreen {
                path: route.path.clone(),
                screen: route.screen.clone(),
            }
            .into());
        }
        let route_count = routes.iter().count();

        let hooks = HookBus::with_default_priority(config.hooks.default_priority);
        let reconciler = Reconciler::new(host, config.reconciler.child_diff, hooks.clone());
        let location: Arc<dyn LocationSource> = location
            .unwrap_or_else(|| Arc::new(MemoryLocation::new(&config.router.root)));
        let state = StateStore::new();

        let inner = Arc::new_cyclic(|weak| {
            let runtime = WeakRuntime {
                inner: weak.clone(),
            };
            let services = ScreenServices {
                store: state.clone(),
                runtime: runtime.clone(),
                translator: Arc::clone(&translator),
                auth: Arc::clone(&auth),
            };
            let router = Router::new(RouterParts {
                routes,
                screens,
                guards,
                config: config.router.clone(),
                hooks: hooks.clone(),
                reconciler,
                location: Arc::clone(&location),
                mount,
                services,
            });

            RuntimeInner {
                plugins: PluginRegistry::new(hooks.clone(), runtime),
                config,
                hooks,
                router,
                state,
                location,
                translator,
                auth,
                storage,
                listener: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }
        });

        tracing::info!(
            routes = route_count,
            mount = %mount,
            child_diff = ?inner.config.reconciler.child_diff,
            "Runtime built"
        );
        Ok(Runtime { inner })
    }
}
