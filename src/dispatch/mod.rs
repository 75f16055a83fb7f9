//! Hook bus and plugin loader shared by the reconciler and the router.
//!
//! ```text
//! register ──→ load order (DFS) ──→ init ──→ on(hook) ──→ emit
//! ```

mod error;
mod hooks;
mod plugins;

pub use error::PluginError;
pub use hooks::{
    hook_fn, FnHandler, HookBus, HookEvent, HookHandler, SubscriptionId, CORE_OWNER,
    DEFAULT_PRIORITY,
};
pub use plugins::{
    resolve_load_order, InitReport, Plugin, PluginContext, PluginOptions, PluginRegistry,
    PluginStatus,
};

/// Lifecycle hook names emitted by the runtime.
pub mod events {
    pub const HOOK_ERROR: &str = "hook:error";

    pub const RENDER_BEFORE: &str = "render:before";
    pub const RENDER_COMPLETE: &str = "render:complete";

    pub const NAVIGATION_START: &str = "navigation:start";
    pub const NAVIGATION_COMPLETE: &str = "navigation:complete";
    pub const NAVIGATION_CANCELLED: &str = "navigation:cancelled";
    pub const NAVIGATION_REDIRECT: &str = "navigation:redirect";
    pub const NAVIGATION_NOT_FOUND: &str = "navigation:not-found";
    pub const NAVIGATION_ERROR: &str = "navigation:error";

    pub const STATE_BEFORE_CHANGE: &str = "state:before-change";
    pub const STATE_CHANGE: &str = "state:change";

    pub const APP_READY: &str = "app:ready";
    pub const APP_SHUTDOWN: &str = "app:shutdown";
}
