//! Ordered, priority-aware hook bus.
//!
//! Subscribers are kept sorted ascending by priority (lower runs first).
//! Equal priorities keep registration order. `emit` runs every enabled
//! subscriber one after another and keeps going when one of them fails.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::dispatch::events;

/// Owner recorded for subscriptions made outside any plugin.
pub const CORE_OWNER: &str = "core";

/// Priority used when none is supplied and no config overrides it.
pub const DEFAULT_PRIORITY: i32 = 50;

/// One emission delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub name: String,
    pub payload: Value,
}

/// A hook subscriber.
///
/// Handlers that need the runtime capture a handle to it when they are
/// created (plugins receive one in their init context).
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, event: &HookEvent) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`HookHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> HookHandler for FnHandler<F>
where
    F: Fn(HookEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, event: &HookEvent) -> anyhow::Result<Value> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a hook handler.
pub fn hook_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HookEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    FnHandler(f)
}

/// Handle returned by `on`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    owner: String,
    handler: Arc<dyn HookHandler>,
    priority: i32,
    enabled: bool,
}

#[derive(Default)]
struct HookRegistry {
    hooks: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

/// Shared hook bus. Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct HookBus {
    inner: Arc<RwLock<HookRegistry>>,
    default_priority: i32,
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self::with_default_priority(DEFAULT_PRIORITY)
    }

    pub fn with_default_priority(default_priority: i32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HookRegistry::default())),
            default_priority,
        }
    }

    /// Subscribe as the core owner. `None` priority means the default.
    ///
    /// Registering the same handler twice produces two entries.
    pub fn on(
        &self,
        hook: &str,
        handler: impl HookHandler + 'static,
        priority: Option<i32>,
    ) -> SubscriptionId {
        self.on_owned(CORE_OWNER, hook, handler, priority)
    }

    /// Subscribe on behalf of `owner` (normally a plugin name).
    pub fn on_owned(
        &self,
        owner: &str,
        hook: &str,
        handler: impl HookHandler + 'static,
        priority: Option<i32>,
    ) -> SubscriptionId {
        let priority = priority.unwrap_or(self.default_priority);
        let mut registry = self.inner.write();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);

        let list = registry.hooks.entry(hook.to_string()).or_default();
        let position = list.partition_point(|s| s.priority <= priority);
        list.insert(
            position,
            Subscriber {
                id,
                owner: owner.to_string(),
                handler: Arc::new(handler),
                priority,
                enabled: true,
            },
        );

        tracing::trace!(hook = %hook, owner = %owner, priority, "Hook subscriber added");
        id
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.write();
        let mut removed = false;
        for list in registry.hooks.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        registry.hooks.retain(|_, list| !list.is_empty());
        removed
    }

    /// Remove every subscription made by `owner`. Returns how many went.
    pub fn off_owner(&self, owner: &str) -> usize {
        let mut registry = self.inner.write();
        let mut removed = 0;
        for list in registry.hooks.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed += before - list.len();
        }
        registry.hooks.retain(|_, list| !list.is_empty());
        removed
    }

    /// Enable or disable every subscription made by `owner`.
    pub fn set_owner_enabled(&self, owner: &str, enabled: bool) {
        let mut registry = self.inner.write();
        for subscriber in registry.hooks.values_mut().flatten() {
            if subscriber.owner == owner {
                subscriber.enabled = enabled;
            }
        }
    }

    /// Whether `hook` has at least one subscriber.
    pub fn has(&self, hook: &str) -> bool {
        self.count(hook) > 0
    }

    /// Number of subscribers (enabled or not) on `hook`.
    pub fn count(&self, hook: &str) -> usize {
        self.inner.read().hooks.get(hook).map_or(0, Vec::len)
    }

    /// Run every enabled subscriber of `hook` in priority order.
    ///
    /// A failing subscriber is logged and reported through `hook:error`;
    /// the rest still run. Returns the results of the ones that succeeded.
    pub async fn emit(&self, hook: &str, payload: Value) -> Vec<Value> {
        let event = HookEvent {
            name: hook.to_string(),
            payload,
        };
        let subscribers = self.snapshot(hook);
        let mut results = Vec::with_capacity(subscribers.len());

        for (owner, handler) in subscribers {
            match handler.handle(&event).await {
                Ok(value) => results.push(value),
                Err(err) => {
                    tracing::error!(
                        hook = %hook,
                        owner = %owner,
                        error = %format!("{:#}", err),
                        "Hook handler failed"
                    );
                    if hook != events::HOOK_ERROR {
                        self.report_failure(hook, &owner, &err).await;
                    }
                }
            }
        }

        results
    }

    /// Deliver `hook:error`. Failures here are only logged, never re-reported.
    async fn report_failure(&self, hook: &str, owner: &str, err: &anyhow::Error) {
        let event = HookEvent {
            name: events::HOOK_ERROR.to_string(),
            payload: json!({
                "hook": hook,
                "owner": owner,
                "error": format!("{:#}", err),
            }),
        };
        for (error_owner, handler) in self.snapshot(events::HOOK_ERROR) {
            if let Err(nested) = handler.handle(&event).await {
                tracing::error!(
                    owner = %error_owner,
                    error = %format!("{:#}", nested),
                    "hook:error handler failed"
                );
            }
        }
    }

    /// Clone out the enabled subscribers so no lock is held across awaits.
    fn snapshot(&self, hook: &str) -> Vec<(String, Arc<dyn HookHandler>)> {
        self.inner
            .read()
            .hooks
            .get(hook)
            .map(|list| {
                list.iter()
                    .filter(|s| s.enabled)
                    .map(|s| (s.owner.clone(), Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl HookHandler {
        hook_fn(move |_event| {
            let log = log.clone();
            async move {
                log.lock().push(tag.to_string());
                Ok(Value::Null)
            }
        })
    }

    #[tokio::test]
    async fn test_priority_order_with_stable_ties() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on("tick", recorder(log.clone(), "default-a"), None);
        bus.on("tick", recorder(log.clone(), "early"), Some(10));
        bus.on("tick", recorder(log.clone(), "late"), Some(90));
        bus.on("tick", recorder(log.clone(), "default-b"), Some(50));

        bus.emit("tick", Value::Null).await;

        assert_eq!(
            *log.lock(),
            vec!["early", "default-a", "default-b", "late"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration_runs_twice() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on("tick", recorder(log.clone(), "same"), None);
        bus.on("tick", recorder(log.clone(), "same"), None);
        bus.emit("tick", Value::Null).await;

        assert_eq!(log.lock().len(), 2);
        assert_eq!(bus.count("tick"), 2);
    }

    #[tokio::test]
    async fn test_off_removes_single_subscription() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = bus.on("tick", recorder(log.clone(), "gone"), None);
        bus.on("tick", recorder(log.clone(), "kept"), None);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.emit("tick", Value::Null).await;

        assert_eq!(*log.lock(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_disabled_owner_is_skipped() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on_owned("metrics", "tick", recorder(log.clone(), "metrics"), None);
        bus.on("tick", recorder(log.clone(), "core"), None);

        bus.set_owner_enabled("metrics", false);
        bus.emit("tick", Value::Null).await;
        assert_eq!(*log.lock(), vec!["core"]);

        bus.set_owner_enabled("metrics", true);
        bus.emit("tick", Value::Null).await;
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_empty() {
        let bus = HookBus::new();
        assert!(bus.emit("nothing", json!({"x": 1})).await.is_empty());
        assert!(!bus.has("nothing"));
    }
}
