use thiserror::Error;

use crate::vdom::RenderError;

/// Faults found while building the route table.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Route '{path}' refers to unknown screen '{screen}'")]
    UnknownScreen { path: String, screen: String },

    #[error("Route '{0}' is registered twice")]
    Duplicate(String),
}

/// Navigation faults that could not be turned into a rendered fallback.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Redirect chain starting at '{from}' exceeded {limit} hops")]
    RedirectLoop { from: String, limit: u32 },

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Runtime has been shut down")]
    Stopped,

    #[error("Invalid location '{0}': must start with '/'")]
    InvalidLocation(String),
}
