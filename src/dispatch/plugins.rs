//! Plugin registry with dependency-ordered initialization.
//!
//! Plugins declare the names of plugins they depend on. Registration fails
//! when a dependency is not registered yet. `initialize_all` computes a load
//! order with a depth-first topological sort and initializes plugins in
//! that order. A cycle aborts the whole pass before anything is initialized.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::dispatch::error::PluginError;
use crate::dispatch::hooks::HookBus;

/// What a plugin sees while it initializes or is torn down.
///
/// `host` is whatever the owning registry hands out: the runtime passes a
/// weak handle to itself so hook handlers can reach back into it.
pub struct PluginContext<C> {
    pub name: String,
    pub hooks: HookBus,
    pub options: Value,
    pub host: C,
}

#[async_trait]
pub trait Plugin<C: Send + Sync + 'static>: Send + Sync {
    /// Called once, after every dependency initialized successfully.
    async fn init(&self, ctx: &PluginContext<C>) -> anyhow::Result<()>;

    /// Called by `unregister` for initialized plugins.
    async fn destroy(&self, _ctx: &PluginContext<C>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Registration options.
#[derive(Debug, Clone)]
pub struct PluginOptions {
    pub dependencies: Vec<String>,
    /// Include this plugin in `initialize_all`. When false it is only
    /// initialized through `initialize(name)` (directly or as a dependency).
    pub auto_init: bool,
    /// Free-form options passed through to `init`.
    pub options: Value,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            auto_init: true,
            options: Value::Null,
        }
    }
}

impl PluginOptions {
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn manual(mut self) -> Self {
        self.auto_init = false;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Registered,
    Initialized,
    Failed,
}

struct PluginRecord<C: Send + Sync + 'static> {
    instance: Arc<dyn Plugin<C>>,
    options: Value,
    enabled: bool,
    dependencies: Vec<String>,
    auto_init: bool,
    status: PluginStatus,
}

struct Registry<C: Send + Sync + 'static> {
    plugins: HashMap<String, PluginRecord<C>>,
    /// Registration order, used as the DFS root order.
    order: Vec<String>,
}

/// Outcome of `initialize_all`.
#[derive(Debug, Default)]
pub struct InitReport {
    pub initialized: Vec<String>,
    pub failed: Vec<(String, PluginError)>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PluginRegistry<C: Send + Sync + 'static> {
    inner: Mutex<Registry<C>>,
    hooks: HookBus,
    host: C,
}

impl<C: Clone + Send + Sync + 'static> PluginRegistry<C> {
    pub fn new(hooks: HookBus, host: C) -> Self {
        Self {
            inner: Mutex::new(Registry {
                plugins: HashMap::new(),
                order: Vec::new(),
            }),
            hooks,
            host,
        }
    }

    /// Record a plugin.
    ///
    /// Every declared dependency must already be registered. Registering an
    /// existing name replaces it unless it has been initialized.
    pub fn register(
        &self,
        name: &str,
        instance: impl Plugin<C> + 'static,
        options: PluginOptions,
    ) -> Result<(), PluginError> {
        let mut registry = self.inner.lock();

        if let Some(missing) = options
            .dependencies
            .iter()
            .find(|dep| !registry.plugins.contains_key(dep.as_str()))
        {
            tracing::warn!(plugin = %name, dependency = %missing, "Plugin dependency not registered");
            return Err(PluginError::MissingDependency {
                plugin: name.to_string(),
                dependency: missing.clone(),
            });
        }

        match registry.plugins.get(name).map(|existing| existing.status) {
            Some(PluginStatus::Initialized) => {
                return Err(PluginError::AlreadyInitialized {
                    plugin: name.to_string(),
                });
            }
            Some(_) => tracing::warn!(plugin = %name, "Replacing registered plugin"),
            None => registry.order.push(name.to_string()),
        }

        registry.plugins.insert(
            name.to_string(),
            PluginRecord {
                instance: Arc::new(instance),
                options: options.options,
                enabled: true,
                dependencies: options.dependencies,
                auto_init: options.auto_init,
                status: PluginStatus::Registered,
            },
        );
        tracing::debug!(plugin = %name, "Plugin registered");
        Ok(())
    }

    /// Topological load order over every registered plugin.
    pub fn load_order(&self) -> Result<Vec<String>, PluginError> {
        let registry = self.inner.lock();
        let dependencies: HashMap<&str, &[String]> = registry
            .plugins
            .iter()
            .map(|(name, record)| (name.as_str(), record.dependencies.as_slice()))
            .collect();
        resolve_load_order(&registry.order, &dependencies)
    }

    /// Initialize every enabled auto-init plugin in dependency order.
    ///
    /// A cycle fails the whole call. A plugin whose `init` fails is reported
    /// in the returned `InitReport`, and plugins depending on it are skipped.
    /// Unrelated plugins still initialize.
    pub async fn initialize_all(&self) -> Result<InitReport, PluginError> {
        let order = self.load_order().inspect_err(|err| {
            tracing::error!(error = %err, "Plugin load order could not be resolved");
        })?;

        let mut report = InitReport::default();
        for name in order {
            let wanted = {
                let registry = self.inner.lock();
                registry.plugins.get(&name).is_some_and(|record| {
                    record.auto_init && record.enabled && record.status == PluginStatus::Registered
                })
            };
            if !wanted {
                continue;
            }

            match self.init_one(&name).await {
                Ok(()) => report.initialized.push(name),
                Err(err) => report.failed.push((name, err)),
            }
        }

        tracing::info!(
            initialized = report.initialized.len(),
            failed = report.failed.len(),
            "Plugins initialized"
        );
        Ok(report)
    }

    /// Initialize one plugin, initializing its dependencies first.
    pub async fn initialize(&self, name: &str) -> Result<(), PluginError> {
        let order = self.load_order()?;
        let closure = self.dependency_closure(name)?;

        for candidate in order.iter().filter(|n| closure.contains(n.as_str())) {
            let status = self.status(candidate);
            if status == Some(PluginStatus::Initialized) {
                continue;
            }
            self.init_one(candidate).await?;
        }
        Ok(())
    }

    async fn init_one(&self, name: &str) -> Result<(), PluginError> {
        let (instance, options) = {
            let mut registry = self.inner.lock();
            let record = registry
                .plugins
                .get(name)
                .ok_or_else(|| PluginError::NotFound {
                    plugin: name.to_string(),
                })?;

            if !record.enabled {
                return Err(PluginError::Disabled {
                    plugin: name.to_string(),
                });
            }

            let blocked = record.dependencies.iter().find(|dep| {
                registry
                    .plugins
                    .get(dep.as_str())
                    .map_or(true, |d| d.status != PluginStatus::Initialized)
            });
            if let Some(dep) = blocked {
                let err = PluginError::DependencyFailed {
                    plugin: name.to_string(),
                    dependency: dep.clone(),
                };
                tracing::warn!(plugin = %name, dependency = %dep, "Skipping plugin, dependency unavailable");
                if let Some(record) = registry.plugins.get_mut(name) {
                    record.status = PluginStatus::Failed;
                }
                return Err(err);
            }

            (Arc::clone(&record.instance), record.options.clone())
        };

        let ctx = self.context(name, options);
        let result = instance.init(&ctx).await;

        let mut registry = self.inner.lock();
        let record = registry
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound {
                plugin: name.to_string(),
            })?;

        match result {
            Ok(()) => {
                record.status = PluginStatus::Initialized;
                tracing::debug!(plugin = %name, "Plugin initialized");
                Ok(())
            }
            Err(err) => {
                record.status = PluginStatus::Failed;
                tracing::error!(plugin = %name, error = %format!("{:#}", err), "Plugin init failed");
                Err(PluginError::InitFailed {
                    plugin: name.to_string(),
                    source: err.into(),
                })
            }
        }
    }

    /// Enable a plugin and its hook subscriptions.
    pub fn enable(&self, name: &str) -> Result<(), PluginError> {
        self.set_enabled(name, true)
    }

    /// Disable a plugin. Its hook subscriptions stop receiving events.
    pub fn disable(&self, name: &str) -> Result<(), PluginError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), PluginError> {
        {
            let mut registry = self.inner.lock();
            let record = registry
                .plugins
                .get_mut(name)
                .ok_or_else(|| PluginError::NotFound {
                    plugin: name.to_string(),
                })?;
            record.enabled = enabled;
        }
        self.hooks.set_owner_enabled(name, enabled);
        tracing::debug!(plugin = %name, enabled, "Plugin toggled");
        Ok(())
    }

    /// Remove a plugin nothing depends on. Initialized plugins are destroyed
    /// and their hook subscriptions dropped.
    pub async fn unregister(&self, name: &str) -> Result<(), PluginError> {
        let record = {
            let mut registry = self.inner.lock();
            if !registry.plugins.contains_key(name) {
                return Err(PluginError::NotFound {
                    plugin: name.to_string(),
                });
            }

            let mut dependents: Vec<String> = registry
                .plugins
                .iter()
                .filter(|(_, r)| r.dependencies.iter().any(|d| d == name))
                .map(|(n, _)| n.clone())
                .collect();
            if !dependents.is_empty() {
                dependents.sort();
                return Err(PluginError::HasDependents {
                    plugin: name.to_string(),
                    dependents,
                });
            }

            registry.order.retain(|n| n != name);
            registry.plugins.remove(name)
        };

        if let Some(record) = record {
            if record.status == PluginStatus::Initialized {
                let ctx = self.context(name, record.options.clone());
                if let Err(err) = record.instance.destroy(&ctx).await {
                    tracing::warn!(plugin = %name, error = %format!("{:#}", err), "Plugin destroy failed");
                }
            }
        }

        let dropped = self.hooks.off_owner(name);
        tracing::debug!(plugin = %name, hooks = dropped, "Plugin unregistered");
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.inner.lock().plugins.get(name).map(|r| r.status)
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.status(name) == Some(PluginStatus::Initialized)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.inner.lock().plugins.get(name).is_some_and(|r| r.enabled)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    fn context(&self, name: &str, options: Value) -> PluginContext<C> {
        PluginContext {
            name: name.to_string(),
            hooks: self.hooks.clone(),
            options,
            host: self.host.clone(),
        }
    }

    fn dependency_closure(&self, name: &str) -> Result<HashSet<String>, PluginError> {
        let registry = self.inner.lock();
        if !registry.plugins.contains_key(name) {
            return Err(PluginError::NotFound {
                plugin: name.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(record) = registry.plugins.get(&current) {
                pending.extend(record.dependencies.iter().cloned());
            }
        }
        Ok(seen)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first topological sort with three-colour marking.
///
/// Roots are visited in `roots` order, dependencies before dependents. An
/// edge into a node that is still in progress is a cycle.
pub fn resolve_load_order<'a>(
    roots: &'a [String],
    dependencies: &HashMap<&'a str, &'a [String]>,
) -> Result<Vec<String>, PluginError> {
    let mut marks: HashMap<&'a str, Mark> = HashMap::new();
    let mut stack: Vec<&'a str> = Vec::new();
    let mut order = Vec::with_capacity(roots.len());

    for root in roots {
        visit(root.as_str(), dependencies, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    name: &'a str,
    dependencies: &HashMap<&'a str, &'a [String]>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), PluginError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut chain: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            chain.push(name.to_string());
            return Err(PluginError::CircularDependency { chain });
        }
        None => {}
    }

    marks.insert(name, Mark::InProgress);
    stack.push(name);

    let deps: &[String] = dependencies.get(name).copied().unwrap_or(&[]);
    for dep in deps {
        if !dependencies.contains_key(dep.as_str()) {
            return Err(PluginError::MissingDependency {
                plugin: name.to_string(),
                dependency: dep.clone(),
            });
        }
        visit(dep.as_str(), dependencies, marks, stack, order)?;
    }

    stack.pop();
    marks.insert(name, Mark::Done);
    order.push(name.to_string());
    Ok(())
}
