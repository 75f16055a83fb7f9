//! Virtual tree and reconciler.
//!
//! Screens describe the UI as immutable [`VNode`] trees. The [`Reconciler`]
//! lowers them into a [`HostTree`] and, on later renders, applies only the
//! host mutations needed to move from the committed tree to the new one.

mod event;
mod host;
mod memory;
mod node;
mod reconciler;

pub use event::{EventHandler, HostEvent};
pub use host::{HostError, HostNodeId, HostTree};
pub use memory::{escape_html, MemoryHost};
pub use node::{
    create_node, event_name, is_handler_name, Child, Component, Element, PropValue, Props, Tag,
    VNode,
};
pub use reconciler::{mount_component, resolve, Reconciler, RenderError, RenderStats};
