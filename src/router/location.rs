//! Location sources: where the current location lives and who hears about
//! external changes to it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub trait LocationSource: Send + Sync {
    fn current(&self) -> String;

    /// Record a location committed by the router without notifying
    /// subscribers, so the router does not re-enter itself.
    fn set_silently(&self, location: &str);

    /// Receive locations changed from outside the router.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<String>;
}

struct LocationState {
    current: String,
    subscribers: Vec<mpsc::UnboundedSender<String>>,
}

/// In-memory location, the stand-in for an address bar.
#[derive(Clone)]
pub struct MemoryLocation {
    inner: Arc<Mutex<LocationState>>,
}

impl MemoryLocation {
    pub fn new(initial: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LocationState {
                current: initial.to_string(),
                subscribers: Vec::new(),
            })),
        }
    }

    /// Change the location as a user would and notify subscribers.
    pub fn change(&self, location: &str) {
        let mut state = self.inner.lock();
        state.current = location.to_string();
        state
            .subscribers
            .retain(|tx| tx.send(location.to_string()).is_ok());
        tracing::trace!(location = %location, subscribers = state.subscribers.len(), "Location changed");
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("/")
    }
}

impl LocationSource for MemoryLocation {
    fn current(&self) -> String {
        self.inner.lock().current.clone()
    }

    fn set_silently(&self, location: &str) {
        self.inner.lock().current = location.to_string();
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }
}
