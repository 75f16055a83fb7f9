//! Reconciler: lowers virtual trees into a host tree and patches them.
//!
//! ```text
//! render(tree, target)
//!   ├─ no previous tree → clear target, instantiate, append
//!   └─ previous tree    → patch(target, 0, old, new)
//! ```
//!
//! Components are expanded before diffing, so the committed tree for a mount
//! target only ever holds host elements and text.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use crate::config::ChildDiff;
use crate::dispatch::{events, HookBus};
use crate::vdom::host::{HostError, HostNodeId, HostTree};
use crate::vdom::node::{create_node, event_name, Component, Element, PropValue, Props, Tag, VNode};

/// Faults raised while rendering. They propagate to the caller of `render`.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Host tree fault: {0}")]
    Host(#[from] HostError),

    #[error("Mount target {0} has nothing rendered")]
    NotMounted(HostNodeId),
}

/// What one `render` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// True when the target had no previous tree.
    pub mounted: bool,
    pub mutations: usize,
    pub elapsed: Duration,
}

/// Last committed tree for one mount target.
struct RenderTreeState {
    tree: VNode,
    root: HostNodeId,
}

struct ReconcilerState {
    host: Box<dyn HostTree>,
    trees: HashMap<HostNodeId, RenderTreeState>,
}

pub struct Reconciler {
    state: Mutex<ReconcilerState>,
    child_diff: ChildDiff,
    hooks: HookBus,
}

impl Reconciler {
    pub fn new(host: Box<dyn HostTree>, child_diff: ChildDiff, hooks: HookBus) -> Self {
        Self {
            state: Mutex::new(ReconcilerState {
                host,
                trees: HashMap::new(),
            }),
            child_diff,
            hooks,
        }
    }

    pub fn child_diff(&self) -> ChildDiff {
        self.child_diff
    }

    /// Render `tree` into `target`, mounting on first use and patching after.
    pub async fn render(&self, tree: VNode, target: HostNodeId) -> Result<RenderStats, RenderError> {
        self.hooks
            .emit(events::RENDER_BEFORE, json!({ "target": target.0 }))
            .await;

        let stats = self.commit(tree, target)?;

        tracing::debug!(
            target = %target,
            mounted = stats.mounted,
            mutations = stats.mutations,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "Render committed"
        );
        self.hooks
            .emit(
                events::RENDER_COMPLETE,
                json!({
                    "target": target.0,
                    "mounted": stats.mounted,
                    "mutations": stats.mutations,
                    "elapsed_ms": stats.elapsed.as_secs_f64() * 1000.0,
                }),
            )
            .await;
        Ok(stats)
    }

    fn commit(&self, tree: VNode, target: HostNodeId) -> Result<RenderStats, RenderError> {
        let started = Instant::now();
        let resolved = resolve(&tree);

        let mut state = self.state.lock();
        let ReconcilerState { host, trees } = &mut *state;
        let mut patcher = Patcher {
            host: host.as_mut(),
            child_diff: self.child_diff,
            mutations: 0,
        };

        let mounted = match trees.get(&target) {
            Some(previous) => {
                patcher.patch(target, 0, Some(&previous.tree), Some(&resolved))?;
                false
            }
            None => {
                patcher.host.clear(target)?;
                patcher.mutations += 1;
                let root = patcher.instantiate(&resolved)?;
                patcher.host.append_child(target, root)?;
                patcher.mutations += 1;
                true
            }
        };

        let root = patcher
            .host
            .child_at(target, 0)?
            .ok_or(HostError::MissingChild {
                parent: target,
                index: 0,
            })?;
        let mutations = patcher.mutations;
        trees.insert(
            target,
            RenderTreeState {
                tree: resolved,
                root,
            },
        );

        Ok(RenderStats {
            mounted,
            mutations,
            elapsed: started.elapsed(),
        })
    }

    /// Clear `target` and forget its committed tree.
    pub fn destroy(&self, target: HostNodeId) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        if state.trees.remove(&target).is_none() {
            return Err(RenderError::NotMounted(target));
        }
        state.host.clear(target)?;
        tracing::debug!(target = %target, "Mount target destroyed");
        Ok(())
    }

    /// Whether `target` has a committed tree.
    pub fn is_mounted(&self, target: HostNodeId) -> bool {
        self.state.lock().trees.contains_key(&target)
    }

    /// Host root of the committed tree for `target`.
    pub fn root(&self, target: HostNodeId) -> Option<HostNodeId> {
        self.state.lock().trees.get(&target).map(|s| s.root)
    }

    /// Clone of the committed (component-free) tree for `target`.
    pub fn committed(&self, target: HostNodeId) -> Option<VNode> {
        self.state.lock().trees.get(&target).map(|s| s.tree.clone())
    }
}

/// Call a component with fresh props and lower its output.
///
/// Components may return other components; the result is fully expanded.
pub fn mount_component(component: &Component, props: &Props, children: &[VNode]) -> VNode {
    let produced = component.call(props, children);
    tracing::trace!(component = component.name(), "Component rendered");
    resolve(&produced)
}

/// Expand every component in `node`, leaving only host elements and text.
pub fn resolve(node: &VNode) -> VNode {
    match node {
        VNode::Text(_) => node.clone(),
        VNode::Element(element) => match element.tag() {
            Tag::Component(component) => {
                mount_component(component, element.props(), element.children())
            }
            Tag::Host(name) => create_node(
                name.as_str(),
                element.props().clone(),
                element.children().iter().map(resolve),
            ),
        },
    }
}

/// One pass of host mutations, counting what it does.
struct Patcher<'a> {
    host: &'a mut dyn HostTree,
    child_diff: ChildDiff,
    mutations: usize,
}

impl Patcher<'_> {
    fn instantiate(&mut self, node: &VNode) -> Result<HostNodeId, HostError> {
        match node {
            VNode::Text(text) => {
                self.mutations += 1;
                Ok(self.host.create_text(text))
            }
            VNode::Element(element) => match element.tag() {
                Tag::Component(component) => {
                    let produced =
                        mount_component(component, element.props(), element.children());
                    self.instantiate(&produced)
                }
                Tag::Host(name) => {
                    let id = self.host.create_element(name);
                    self.mutations += 1;
                    for (prop, value) in element.props().iter() {
                        self.set_prop(id, prop, None, value)?;
                    }
                    for child in element.children() {
                        let child_id = self.instantiate(child)?;
                        self.host.append_child(id, child_id)?;
                        self.mutations += 1;
                    }
                    Ok(id)
                }
            },
        }
    }

    /// Reconcile the child of `parent` at `index` from `old` to `new`.
    fn patch(
        &mut self,
        parent: HostNodeId,
        index: usize,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> Result<(), HostError> {
        match (old, new) {
            (None, None) => Ok(()),
            (None, Some(new)) => {
                let id = self.instantiate(new)?;
                self.host.append_child(parent, id)?;
                self.mutations += 1;
                Ok(())
            }
            (Some(_), None) => {
                let existing = self.existing(parent, index)?;
                self.host.remove_child(parent, existing)?;
                self.mutations += 1;
                Ok(())
            }
            (Some(old), Some(new)) if old.changed(new) => {
                let existing = self.existing(parent, index)?;
                let replacement = self.instantiate(new)?;
                self.host.replace_child(parent, existing, replacement)?;
                self.mutations += 1;
                Ok(())
            }
            (Some(old), Some(new)) => {
                let existing = self.existing(parent, index)?;
                self.update(existing, old, new)
            }
        }
    }

    /// Update a host node in place. `old` and `new` must not be `changed`.
    fn update(&mut self, id: HostNodeId, old: &VNode, new: &VNode) -> Result<(), HostError> {
        if let (VNode::Element(old), VNode::Element(new)) = (old, new) {
            self.patch_props(id, old.props(), new.props())?;
            match self.child_diff {
                ChildDiff::Positional => self.patch_children(id, old, new)?,
                ChildDiff::Keyed => self.patch_children_keyed(id, old, new)?,
            }
        }
        Ok(())
    }

    fn patch_children(
        &mut self,
        id: HostNodeId,
        old: &Element,
        new: &Element,
    ) -> Result<(), HostError> {
        let old_children = old.children();
        let new_children = new.children();
        let shared = old_children.len().min(new_children.len());

        for i in 0..shared {
            self.patch(id, i, Some(&old_children[i]), Some(&new_children[i]))?;
        }
        for (i, child) in new_children.iter().enumerate().skip(shared) {
            self.patch(id, i, None, Some(child))?;
        }
        // Remove from the end so earlier indices stay valid.
        for i in (new_children.len()..old_children.len()).rev() {
            self.patch(id, i, Some(&old_children[i]), None)?;
        }
        Ok(())
    }

    /// Key-aware child reconciliation: keyed children are matched by key and
    /// moved; unkeyed children fall back to their own position.
    fn patch_children_keyed(
        &mut self,
        id: HostNodeId,
        old: &Element,
        new: &Element,
    ) -> Result<(), HostError> {
        let old_children = old.children();
        let mut old_hosts = Vec::with_capacity(old_children.len());
        for i in 0..old_children.len() {
            old_hosts.push(self.existing(id, i)?);
        }

        let by_key: HashMap<&str, usize> = old_children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.key().map(|k| (k, i)))
            .collect();
        let mut used = vec![false; old_children.len()];

        for (i, child) in new.children().iter().enumerate() {
            let candidate = match child.key() {
                Some(key) => by_key.get(key).copied(),
                None => (i < old_children.len() && old_children[i].key().is_none()).then_some(i),
            };
            let reuse = candidate.filter(|&j| !used[j] && !old_children[j].changed(child));

            let host_id = match reuse {
                Some(j) => {
                    used[j] = true;
                    self.update(old_hosts[j], &old_children[j], child)?;
                    old_hosts[j]
                }
                None => self.instantiate(child)?,
            };

            if self.host.child_at(id, i)? != Some(host_id) {
                self.host.insert_child(id, host_id, i)?;
                self.mutations += 1;
            }
        }

        for (j, host_id) in old_hosts.into_iter().enumerate() {
            if !used[j] {
                self.host.remove_child(id, host_id)?;
                self.mutations += 1;
            }
        }
        Ok(())
    }

    fn patch_props(&mut self, id: HostNodeId, old: &Props, new: &Props) -> Result<(), HostError> {
        for (name, value) in old.iter() {
            if new.get(name).is_none() {
                self.remove_prop(id, name, value)?;
            }
        }
        for (name, value) in new.iter() {
            let previous = old.get(name);
            if previous != Some(value) {
                self.set_prop(id, name, previous, value)?;
            }
        }
        Ok(())
    }

    fn set_prop(
        &mut self,
        id: HostNodeId,
        name: &str,
        previous: Option<&PropValue>,
        value: &PropValue,
    ) -> Result<(), HostError> {
        let event = event_name(name);
        if previous.and_then(PropValue::as_handler).is_some() {
            self.host.remove_listener(id, &event)?;
            self.mutations += 1;
        }

        if let Some(handler) = value.as_handler() {
            if previous.and_then(PropValue::attribute_value).is_some() {
                self.host.remove_attribute(id, name)?;
                self.mutations += 1;
            }
            self.host.add_listener(id, &event, handler.clone())?;
            self.mutations += 1;
            return Ok(());
        }

        match value.attribute_value() {
            Some(attr) => {
                self.host.set_attribute(id, name, &attr)?;
                self.mutations += 1;
            }
            None => {
                if previous.and_then(PropValue::attribute_value).is_some() {
                    self.host.remove_attribute(id, name)?;
                    self.mutations += 1;
                }
            }
        }
        Ok(())
    }

    fn remove_prop(&mut self, id: HostNodeId, name: &str, value: &PropValue) -> Result<(), HostError> {
        if value.as_handler().is_some() {
            self.host.remove_listener(id, &event_name(name))?;
            self.mutations += 1;
        } else if value.attribute_value().is_some() {
            self.host.remove_attribute(id, name)?;
            self.mutations += 1;
        }
        Ok(())
    }

    fn existing(&self, parent: HostNodeId, index: usize) -> Result<HostNodeId, HostError> {
        self.host
            .child_at(parent, index)?
            .ok_or(HostError::MissingChild { parent, index })
    }
}
