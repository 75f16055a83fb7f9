//! Runtime configuration: TOML types, loading and shared storage.

mod loader;
mod store;
mod types;

pub use loader::ConfigError;
pub use store::ConfigStore;
pub use types::{ChildDiff, HookConfig, LoggingConfig, ReconcilerConfig, RouterConfig, RuntimeConfig};
