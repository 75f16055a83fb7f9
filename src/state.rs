//! Per-instance screen state.
//!
//! Every screen invocation carries an [`InstanceId`]. State slots are keyed
//! by `(instance, slot)` where the slot is the call order of `use_state`
//! inside that invocation, so a screen must call it the same number of
//! times, in the same order, on every render.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dispatch::events;
use crate::router::{NavigationError, NavigationOutcome};
use crate::runtime::WeakRuntime;

/// Identity of one mounted screen instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A change requested through [`StateHandle`].
pub enum StateUpdate {
    /// Shallow-merge an object into an object state. Any other combination
    /// replaces the state outright.
    Merge(Value),
    /// Compute the next state from the previous one.
    Produce(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl StateUpdate {
    pub fn produce<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        StateUpdate::Produce(Box::new(f))
    }

    /// Next state given the current one.
    pub fn apply(self, current: &Value) -> Value {
        match self {
            StateUpdate::Merge(Value::Object(partial)) => match current {
                Value::Object(existing) => {
                    let mut merged = existing.clone();
                    merged.extend(partial);
                    Value::Object(merged)
                }
                _ => Value::Object(partial),
            },
            StateUpdate::Merge(value) => value,
            StateUpdate::Produce(f) => f(current),
        }
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Merge(value) => f.debug_tuple("Merge").field(value).finish(),
            StateUpdate::Produce(_) => f.write_str("Produce(..)"),
        }
    }
}

#[derive(Default)]
struct Slots {
    values: HashMap<(InstanceId, usize), Value>,
    live: HashSet<InstanceId>,
}

/// Slot storage shared by every screen instance of one runtime.
///
/// Only instances opened with [`StateStore::open`] and not yet discarded
/// hold values. Reads and writes against any other instance never store.
#[derive(Clone, Default)]
pub struct StateStore {
    slots: Arc<RwLock<Slots>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `instance` live so its slots can be stored.
    pub fn open(&self, instance: InstanceId) {
        self.slots.write().live.insert(instance);
    }

    pub fn is_live(&self, instance: InstanceId) -> bool {
        self.slots.read().live.contains(&instance)
    }

    /// Current value of a slot, initializing it on first access. A dead
    /// instance gets `init()` back without it being stored.
    pub fn get_or_init(&self, instance: InstanceId, slot: usize, init: impl FnOnce() -> Value) -> Value {
        if let Some(value) = self.slots.read().values.get(&(instance, slot)) {
            return value.clone();
        }
        let mut slots = self.slots.write();
        if !slots.live.contains(&instance) {
            return init();
        }
        slots.values.entry((instance, slot)).or_insert_with(init).clone()
    }

    pub fn get(&self, instance: InstanceId, slot: usize) -> Option<Value> {
        self.slots.read().values.get(&(instance, slot)).cloned()
    }

    /// Read, transform and store a slot under one write lock. Returns
    /// `(before, after)`, or `None` when the instance is not live.
    pub fn update(
        &self,
        instance: InstanceId,
        slot: usize,
        f: impl FnOnce(&Value) -> Value,
    ) -> Option<(Value, Value)> {
        let mut slots = self.slots.write();
        if !slots.live.contains(&instance) {
            return None;
        }
        let entry = slots.values.entry((instance, slot)).or_insert(Value::Null);
        let after = f(entry);
        let before = std::mem::replace(entry, after.clone());
        Some((before, after))
    }

    /// Drop every slot of `instance` and stop accepting writes for it.
    /// Returns how many slots were removed.
    pub fn discard(&self, instance: InstanceId) -> usize {
        let mut slots = self.slots.write();
        slots.live.remove(&instance);
        let before = slots.values.len();
        slots.values.retain(|(owner, _), _| *owner != instance);
        before - slots.values.len()
    }

    /// Number of stored slots across all instances.
    pub fn len(&self) -> usize {
        self.slots.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().values.is_empty()
    }
}

/// Handle to one state slot, returned by `ScreenContext::use_state`.
///
/// Updating it re-navigates the current screen so the change shows up.
#[derive(Clone)]
pub struct StateHandle {
    instance: InstanceId,
    slot: usize,
    store: StateStore,
    runtime: WeakRuntime,
}

impl StateHandle {
    pub(crate) fn new(instance: InstanceId, slot: usize, store: StateStore, runtime: WeakRuntime) -> Self {
        Self {
            instance,
            slot,
            store,
            runtime,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn get(&self) -> Value {
        self.store
            .get(self.instance, self.slot)
            .unwrap_or(Value::Null)
    }

    /// Shallow-merge `partial` into an object state, or replace the state.
    pub async fn set(&self, partial: Value) -> Result<NavigationOutcome, NavigationError> {
        self.apply(StateUpdate::Merge(partial)).await
    }

    /// Replace the state with `f(previous)`.
    pub async fn update<F>(&self, f: F) -> Result<NavigationOutcome, NavigationError>
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        self.apply(StateUpdate::produce(f)).await
    }

    /// Commit `update`, announce it, then re-render the current screen.
    ///
    /// Once the runtime is gone the value is still stored but nothing
    /// re-renders. A handle whose instance was already unmounted stores
    /// nothing and returns `Unchanged`.
    pub async fn apply(&self, update: StateUpdate) -> Result<NavigationOutcome, NavigationError> {
        let Some(runtime) = self.runtime.upgrade() else {
            self.store
                .update(self.instance, self.slot, |current| update.apply(current));
            return Err(NavigationError::Stopped);
        };
        if runtime.is_stopped() {
            return Err(NavigationError::Stopped);
        }
        if !self.store.is_live(self.instance) {
            tracing::debug!(instance = %self.instance, slot = self.slot, "Update for unmounted instance ignored");
            return Ok(NavigationOutcome::Unchanged);
        }

        runtime
            .hooks()
            .emit(
                events::STATE_BEFORE_CHANGE,
                json!({
                    "instance": self.instance.to_string(),
                    "slot": self.slot,
                    "before": self.get(),
                }),
            )
            .await;

        let Some((before, after)) = self
            .store
            .update(self.instance, self.slot, |current| update.apply(current))
        else {
            return Ok(NavigationOutcome::Unchanged);
        };
        tracing::debug!(instance = %self.instance, slot = self.slot, "State updated");
        runtime
            .hooks()
            .emit(
                events::STATE_CHANGE,
                json!({
                    "instance": self.instance.to_string(),
                    "slot": self.slot,
                    "before": before,
                    "after": after,
                }),
            )
            .await;

        runtime.reload().await
    }
}
