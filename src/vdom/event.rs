//! Host event listeners attached through `on<Event>` props.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::vdom::host::HostNodeId;

/// An event delivered by the host to a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    /// Event name without the `on` prefix, e.g. `click`.
    pub name: String,
    /// Node the event was dispatched on.
    pub target: HostNodeId,
    /// Optional value carried by the event (input text and the like).
    pub value: Option<String>,
}

type ListenerFn = dyn Fn(HostEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// Shared, cheaply clonable event listener.
///
/// Equality is identity: two handlers are equal only when they are clones
/// of the same listener.
#[derive(Clone)]
pub struct EventHandler(Arc<ListenerFn>);

impl EventHandler {
    /// Wrap an async listener.
    pub fn new<F, Fut>(listener: F) -> Self
    where
        F: Fn(HostEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |event: HostEvent| listener(event).boxed()))
    }

    /// Wrap a listener that does all of its work synchronously.
    pub fn sync<F>(listener: F) -> Self
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(move |event: HostEvent| {
            listener(&event);
            futures::future::ready(()).boxed()
        }))
    }

    pub async fn call(&self, event: HostEvent) {
        (self.0)(event).await
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}
