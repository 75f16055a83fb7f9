//! Location matching, guards, history and the navigation engine.

mod engine;
mod error;
mod fallback;
mod guard;
mod history;
mod location;
mod pattern;
mod route;

pub use engine::{NavigateOptions, NavigationOutcome, Router};
pub use error::{NavigationError, RouteError};
pub use fallback::{error_page, not_found_page, FALLBACK_ATTR};
pub use guard::{guard_fn, FnGuard, Guard, GuardOutcome, NavigationContext, RequireAuth};
pub use history::History;
pub use location::{LocationSource, MemoryLocation};
pub use pattern::{split_location, PathPattern};
pub use route::RouteDefinition;

pub(crate) use engine::RouterParts;
pub(crate) use route::RouteTable;
