//! The runtime handle: one set of registries, one mount target, one router.
//!
//! `Runtime` is a cheap clonable handle. Anything that has to call back into
//! the runtime without keeping it alive (hook handlers, plugins, event
//! listeners, state handles) holds a [`WeakRuntime`] instead.

mod builder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, RuntimeConfig};
use crate::dispatch::{events, HookBus, PluginError, PluginRegistry};
use crate::router::{
    LocationSource, NavigateOptions, NavigationError, NavigationOutcome, RouteError, Router,
};
use crate::screen::{AuthProvider, Translator};
use crate::state::StateStore;
use crate::storage::Storage;
use crate::vdom::HostNodeId;

pub use builder::RuntimeBuilder;

/// Faults raised while building or starting a runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

struct RuntimeInner {
    config: RuntimeConfig,
    hooks: HookBus,
    plugins: PluginRegistry<WeakRuntime>,
    router: Router,
    state: StateStore,
    location: Arc<dyn LocationSource>,
    translator: Arc<dyn Translator>,
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn Storage>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning runtime handle.
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    /// A handle that never upgrades.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    pub fn builder(host: impl crate::vdom::HostTree + 'static, mount: HostNodeId) -> RuntimeBuilder {
        RuntimeBuilder::new(host, mount)
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn hooks(&self) -> &HookBus {
        &self.inner.hooks
    }

    pub fn plugins(&self) -> &PluginRegistry<WeakRuntime> {
        &self.inner.plugins
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn state(&self) -> &StateStore {
        &self.inner.state
    }

    pub fn location(&self) -> &dyn LocationSource {
        self.inner.location.as_ref()
    }

    pub fn translator(&self) -> &dyn Translator {
        self.inner.translator.as_ref()
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.inner.auth.as_ref()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    pub fn mount(&self) -> HostNodeId {
        self.inner.router.mount()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Initialize plugins, announce readiness and show the current location.
    pub async fn start(&self) -> Result<NavigationOutcome, RuntimeError> {
        let report = self.inner.plugins.initialize_all().await?;
        for (name, err) in &report.failed {
            tracing::warn!(plugin = %name, error = %err, "Plugin unavailable");
        }

        let location = self.inner.location.current();
        self.inner
            .hooks
            .emit(
                events::APP_READY,
                json!({ "location": location, "plugins": report.initialized }),
            )
            .await;
        tracing::info!(location = %location, "Runtime started");

        Ok(self.navigate(&location).await?)
    }

    pub async fn navigate(&self, location: &str) -> Result<NavigationOutcome, NavigationError> {
        self.navigate_with(location, NavigateOptions::default())
            .await
    }

    pub async fn navigate_with(
        &self,
        location: &str,
        options: NavigateOptions,
    ) -> Result<NavigationOutcome, NavigationError> {
        if self.is_stopped() {
            return Err(NavigationError::Stopped);
        }
        self.inner.router.navigate(location, options).await
    }

    /// Navigate without adding a history entry.
    pub async fn replace(&self, location: &str) -> Result<NavigationOutcome, NavigationError> {
        self.navigate_with(location, NavigateOptions::replace())
            .await
    }

    pub async fn back(&self) -> Result<NavigationOutcome, NavigationError> {
        if self.is_stopped() {
            return Err(NavigationError::Stopped);
        }
        self.inner.router.back().await
    }

    /// Force a re-render of the current location.
    pub async fn reload(&self) -> Result<NavigationOutcome, NavigationError> {
        if self.is_stopped() {
            return Err(NavigationError::Stopped);
        }
        self.inner.router.reload().await
    }

    pub fn current(&self) -> Option<String> {
        self.inner.router.current()
    }

    pub fn history(&self) -> Vec<String> {
        self.inner.router.history()
    }

    /// Follow external location changes on a background task.
    ///
    /// Calling it again replaces the previous listener.
    pub fn listen(&self) {
        let mut changes = self.inner.location.subscribe();
        let weak = self.downgrade();

        let handle = tokio::spawn(async move {
            while let Some(location) = changes.recv().await {
                let Some(runtime) = weak.upgrade() else {
                    break;
                };
                match runtime.navigate(&location).await {
                    Ok(outcome) => {
                        tracing::debug!(location = %location, outcome = ?outcome, "Followed location change")
                    }
                    Err(NavigationError::Stopped) => break,
                    Err(err) => {
                        tracing::warn!(location = %location, error = %err, "Location change failed")
                    }
                }
            }
            tracing::debug!("Location listener finished");
        });

        if let Some(previous) = self.inner.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop listening, announce shutdown, then tear down plugins (dependents
    /// first) and the mounted tree.
    ///
    /// Idempotent. Navigation afterwards fails with `Stopped`.
    pub async fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.router.stop();

        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }

        self.inner
            .hooks
            .emit(events::APP_SHUTDOWN, json!({}))
            .await;

        let plugins = &self.inner.plugins;
        match plugins.load_order() {
            Ok(order) => {
                for name in order.iter().rev() {
                    if let Err(err) = plugins.unregister(name).await {
                        tracing::warn!(plugin = %name, error = %err, "Plugin teardown failed");
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "Skipping plugin teardown"),
        }

        self.inner.router.unmount();
        tracing::info!("Runtime shut down");
    }
}
