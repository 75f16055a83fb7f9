use thiserror::Error;

/// Plugin registration and initialization faults.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin '{plugin}' depends on unregistered plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Circular plugin dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Plugin '{plugin}' is not registered")]
    NotFound { plugin: String },

    #[error("Plugin '{plugin}' is already initialized")]
    AlreadyInitialized { plugin: String },

    #[error("Plugin '{plugin}' is disabled")]
    Disabled { plugin: String },

    #[error("Plugin '{plugin}' skipped: dependency '{dependency}' is not initialized")]
    DependencyFailed { plugin: String, dependency: String },

    #[error("Plugin '{plugin}' is required by: {}", dependents.join(", "))]
    HasDependents {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("Plugin '{plugin}' failed to initialize: {source}")]
    InitFailed {
        plugin: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
