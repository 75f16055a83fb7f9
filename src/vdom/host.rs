//! Host presentation tree boundary.
//!
//! The reconciler only needs to create primitive nodes, configure their
//! attributes and listeners, and splice them into a parent.

use std::fmt;

use thiserror::Error;

use crate::vdom::event::EventHandler;

/// Opaque handle to a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNodeId(pub u64);

impl fmt::Display for HostNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Faults raised by a host tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Unknown host node {0}")]
    UnknownNode(HostNodeId),

    #[error("Host node {child} is not a child of {parent}")]
    NotAChild {
        parent: HostNodeId,
        child: HostNodeId,
    },

    #[error("Host node {parent} has no child at index {index}")]
    MissingChild { parent: HostNodeId, index: usize },

    #[error("Host node {0} cannot hold children")]
    NotAContainer(HostNodeId),
}

/// Capabilities the reconciler needs from a mount target's host tree.
pub trait HostTree: Send {
    fn create_element(&mut self, tag: &str) -> HostNodeId;

    fn create_text(&mut self, text: &str) -> HostNodeId;

    fn set_attribute(&mut self, node: HostNodeId, name: &str, value: &str)
        -> Result<(), HostError>;

    fn remove_attribute(&mut self, node: HostNodeId, name: &str) -> Result<(), HostError>;

    fn add_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError>;

    fn remove_listener(&mut self, node: HostNodeId, event: &str) -> Result<(), HostError>;

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    /// Insert `child` at `index`, detaching it from wherever it was first.
    fn insert_child(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        index: usize,
    ) -> Result<(), HostError>;

    fn replace_child(
        &mut self,
        parent: HostNodeId,
        old: HostNodeId,
        new: HostNodeId,
    ) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    /// Remove every child of `node`.
    fn clear(&mut self, node: HostNodeId) -> Result<(), HostError>;

    fn child_at(&self, parent: HostNodeId, index: usize) -> Result<Option<HostNodeId>, HostError>;
}
