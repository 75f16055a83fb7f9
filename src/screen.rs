//! Screens and the context threaded into every screen invocation.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::runtime::WeakRuntime;
use crate::state::{InstanceId, StateHandle, StateStore};
use crate::vdom::{Props, VNode};

/// A screen turns its context into a virtual tree.
pub type Screen = Arc<dyn Fn(&ScreenContext) -> anyhow::Result<VNode> + Send + Sync>;

/// Wrap a closure as a [`Screen`].
pub fn screen<F>(f: F) -> Screen
where
    F: Fn(&ScreenContext) -> anyhow::Result<VNode> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// String lookup used by `ScreenContext::translate`.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// Returns every key unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Fixed key → text table. Unknown keys fall back to the key itself.
#[derive(Debug, Default, Clone)]
pub struct MapTranslator {
    entries: BTreeMap<String, String>,
}

impl MapTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, text: &str) -> Self {
        self.entries.insert(key.to_string(), text.to_string());
        self
    }
}

impl Translator for MapTranslator {
    fn translate(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Authentication and permission queries.
pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn has_permission(&self, permission: &str) -> bool;
}

/// Nobody is signed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl AuthProvider for Anonymous {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn has_permission(&self, _permission: &str) -> bool {
        false
    }
}

/// In-memory session that can be signed in and out at runtime.
#[derive(Debug, Default, Clone)]
pub struct SessionAuth {
    inner: Arc<RwLock<Option<HashSet<String>>>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in<I, S>(&self, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.write() = Some(permissions.into_iter().map(Into::into).collect());
    }

    pub fn sign_out(&self) {
        *self.inner.write() = None;
    }
}

impl AuthProvider for SessionAuth {
    fn is_authenticated(&self) -> bool {
        self.inner.read().is_some()
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.inner
            .read()
            .as_ref()
            .is_some_and(|granted| granted.contains(permission))
    }
}

/// Everything a screen can see while it renders.
///
/// `props` holds the route's default props overlaid with the matched
/// parameters and a `location` entry. `use_state` slots are assigned by call
/// order, so the context is single-use: one invocation, one context.
pub struct ScreenContext {
    pub props: Props,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub location: String,
    instance: InstanceId,
    next_slot: Cell<usize>,
    store: StateStore,
    runtime: WeakRuntime,
    translator: Arc<dyn Translator>,
    auth: Arc<dyn AuthProvider>,
}

/// Collaborators a screen context is built from.
#[derive(Clone)]
pub(crate) struct ScreenServices {
    pub store: StateStore,
    pub runtime: WeakRuntime,
    pub translator: Arc<dyn Translator>,
    pub auth: Arc<dyn AuthProvider>,
}

impl ScreenContext {
    pub(crate) fn new(
        location: String,
        props: Props,
        params: BTreeMap<String, String>,
        query: BTreeMap<String, String>,
        instance: InstanceId,
        services: &ScreenServices,
    ) -> Self {
        Self {
            props,
            params,
            query,
            location,
            instance,
            next_slot: Cell::new(0),
            store: services.store.clone(),
            runtime: services.runtime.clone(),
            translator: Arc::clone(&services.translator),
            auth: Arc::clone(&services.auth),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Next state slot, seeded with `initial` the first time.
    pub fn use_state(&self, initial: Value) -> StateHandle {
        self.use_state_with(|| initial)
    }

    /// Next state slot, seeded lazily from `init` the first time.
    pub fn use_state_with(&self, init: impl FnOnce() -> Value) -> StateHandle {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        self.store.get_or_init(self.instance, slot, init);
        StateHandle::new(self.instance, slot, self.store.clone(), self.runtime.clone())
    }

    pub fn translate(&self, key: &str) -> String {
        self.translator.translate(key)
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.auth.has_permission(permission)
    }

    /// Handle to the runtime, for event handlers that navigate.
    pub fn runtime(&self) -> WeakRuntime {
        self.runtime.clone()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
