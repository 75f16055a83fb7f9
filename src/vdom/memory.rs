//! In-memory host tree.
//!
//! Used by the CLI to produce HTML and by tests to inspect what the
//! reconciler did. `MemoryHost` is a cheap handle: clones share one tree,
//! so a caller can keep a handle while the runtime owns another.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::vdom::event::{EventHandler, HostEvent};
use crate::vdom::host::{HostError, HostNodeId, HostTree};

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        listeners: HashMap<String, EventHandler>,
    },
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: HashMap<HostNodeId, MemoryNode>,
    next_id: u64,
    mutations: u64,
}

impl MemoryTree {
    fn insert(&mut self, kind: NodeKind) -> HostNodeId {
        self.next_id += 1;
        let id = HostNodeId(self.next_id);
        self.nodes.insert(
            id,
            MemoryNode {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn node(&self, id: HostNodeId) -> Result<&MemoryNode, HostError> {
        self.nodes.get(&id).ok_or(HostError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: HostNodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(&id).ok_or(HostError::UnknownNode(id))
    }

    fn container_mut(&mut self, id: HostNodeId) -> Result<&mut MemoryNode, HostError> {
        let node = self.node_mut(id)?;
        match node.kind {
            NodeKind::Element { .. } => Ok(node),
            NodeKind::Text(_) => Err(HostError::NotAContainer(id)),
        }
    }

    fn detach(&mut self, child: HostNodeId) -> Result<(), HostError> {
        let parent = self.node(child)?.parent;
        if let Some(parent) = parent {
            let siblings = &mut self.node_mut(parent)?.children;
            siblings.retain(|c| *c != child);
        }
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Drop a detached subtree from the arena.
    fn discard(&mut self, root: HostNodeId) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                pending.extend(node.children);
            }
        }
    }

    fn element_parts(
        &mut self,
        id: HostNodeId,
    ) -> Result<(&mut Vec<(String, String)>, &mut HashMap<String, EventHandler>), HostError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element {
                attributes,
                listeners,
                ..
            } => Ok((attributes, listeners)),
            NodeKind::Text(_) => Err(HostError::NotAContainer(id)),
        }
    }

    fn write_html(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_html(text)),
            NodeKind::Element {
                tag, attributes, ..
            } => {
                let _ = write!(out, "<{}", tag);
                for (name, value) in attributes {
                    if value.is_empty() {
                        let _ = write!(out, " {}", name);
                    } else {
                        let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
                    }
                }
                out.push('>');
                for child in &node.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }

    fn write_text(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let NodeKind::Text(text) = &node.kind {
            out.push_str(text);
        }
        for child in &node.children {
            self.write_text(*child, out);
        }
    }
}

/// Shared in-memory host tree.
#[derive(Clone, Default)]
pub struct MemoryHost {
    inner: Arc<Mutex<MemoryTree>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to use as a mount target.
    ///
    /// Not counted as a mutation.
    pub fn create_mount(&self, tag: &str) -> HostNodeId {
        self.inner.lock().insert(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
            listeners: HashMap::new(),
        })
    }

    /// Host mutations performed so far.
    pub fn mutations(&self) -> u64 {
        self.inner.lock().mutations
    }

    pub fn reset_mutations(&self) {
        self.inner.lock().mutations = 0;
    }

    /// Serialize `node` and its subtree. Text and attribute values are escaped.
    pub fn to_html(&self, node: HostNodeId) -> String {
        let mut out = String::new();
        self.inner.lock().write_html(node, &mut out);
        out
    }

    /// Serialize the children of `node` without the node itself.
    pub fn inner_html(&self, node: HostNodeId) -> String {
        let tree = self.inner.lock();
        let mut out = String::new();
        if let Some(n) = tree.nodes.get(&node) {
            for child in &n.children {
                tree.write_html(*child, &mut out);
            }
        }
        out
    }

    /// Concatenated raw text of the subtree.
    pub fn text_content(&self, node: HostNodeId) -> String {
        let mut out = String::new();
        self.inner.lock().write_text(node, &mut out);
        out
    }

    pub fn children(&self, node: HostNodeId) -> Vec<HostNodeId> {
        self.inner
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: HostNodeId) -> Option<String> {
        match &self.inner.lock().nodes.get(&node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, node: HostNodeId, name: &str) -> Option<String> {
        match &self.inner.lock().nodes.get(&node)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn has_listener(&self, node: HostNodeId, event: &str) -> bool {
        match self.inner.lock().nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners.contains_key(event),
            _ => false,
        }
    }

    /// Depth-first search below `root` for an element whose attribute matches.
    pub fn find_by_attr(&self, root: HostNodeId, name: &str, value: &str) -> Option<HostNodeId> {
        let tree = self.inner.lock();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let node = tree.nodes.get(&id)?;
            if let NodeKind::Element { attributes, .. } = &node.kind {
                if attributes.iter().any(|(n, v)| n == name && v == value) {
                    return Some(id);
                }
            }
            pending.extend(node.children.iter().rev());
        }
        None
    }

    /// Fire `event` at `target`, bubbling to ancestors until a listener is
    /// found. Returns whether any listener ran.
    pub async fn dispatch(&self, target: HostNodeId, event: &str, value: Option<String>) -> bool {
        let handler = {
            let tree = self.inner.lock();
            let mut current = Some(target);
            let mut found = None;
            while let Some(id) = current {
                let Some(node) = tree.nodes.get(&id) else {
                    break;
                };
                if let NodeKind::Element { listeners, .. } = &node.kind {
                    if let Some(handler) = listeners.get(event) {
                        found = Some(handler.clone());
                        break;
                    }
                }
                current = node.parent;
            }
            found
        };

        match handler {
            Some(handler) => {
                handler
                    .call(HostEvent {
                        name: event.to_string(),
                        target,
                        value,
                    })
                    .await;
                true
            }
            None => false,
        }
    }
}

impl HostTree for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostNodeId {
        let mut tree = self.inner.lock();
        tree.mutations += 1;
        tree.insert(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
            listeners: HashMap::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> HostNodeId {
        let mut tree = self.inner.lock();
        tree.mutations += 1;
        tree.insert(NodeKind::Text(text.to_string()))
    }

    fn set_attribute(&mut self, node: HostNodeId, name: &str, value: &str) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let (attributes, _) = tree.element_parts(node)?;
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        tree.mutations += 1;
        Ok(())
    }

    fn remove_attribute(&mut self, node: HostNodeId, name: &str) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let (attributes, _) = tree.element_parts(node)?;
        attributes.retain(|(n, _)| n != name);
        tree.mutations += 1;
        Ok(())
    }

    fn add_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let (_, listeners) = tree.element_parts(node)?;
        listeners.insert(event.to_string(), handler);
        tree.mutations += 1;
        Ok(())
    }

    fn remove_listener(&mut self, node: HostNodeId, event: &str) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let (_, listeners) = tree.element_parts(node)?;
        listeners.remove(event);
        tree.mutations += 1;
        Ok(())
    }

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        tree.container_mut(parent)?;
        tree.detach(child)?;
        tree.node_mut(child)?.parent = Some(parent);
        tree.container_mut(parent)?.children.push(child);
        tree.mutations += 1;
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        index: usize,
    ) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        tree.container_mut(parent)?;
        tree.detach(child)?;
        tree.node_mut(child)?.parent = Some(parent);
        let children = &mut tree.container_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        tree.mutations += 1;
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: HostNodeId,
        old: HostNodeId,
        new: HostNodeId,
    ) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let position = tree
            .container_mut(parent)?
            .children
            .iter()
            .position(|c| *c == old)
            .ok_or(HostError::NotAChild { parent, child: old })?;
        tree.detach(new)?;
        tree.container_mut(parent)?.children[position] = new;
        tree.node_mut(new)?.parent = Some(parent);
        tree.discard(old);
        tree.mutations += 1;
        Ok(())
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        if tree.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        tree.detach(child)?;
        tree.discard(child);
        tree.mutations += 1;
        Ok(())
    }

    fn clear(&mut self, node: HostNodeId) -> Result<(), HostError> {
        let mut tree = self.inner.lock();
        let children = std::mem::take(&mut tree.container_mut(node)?.children);
        for child in children {
            tree.discard(child);
        }
        tree.mutations += 1;
        Ok(())
    }

    fn child_at(&self, parent: HostNodeId, index: usize) -> Result<Option<HostNodeId>, HostError> {
        let tree = self.inner.lock();
        Ok(tree.node(parent)?.children.get(index).copied())
    }
}

/// Escape text for safe inclusion in HTML content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
