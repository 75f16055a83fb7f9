//! Built-in pages shown when no not-found or error route is registered.

use crate::nodes;
use crate::runtime::WeakRuntime;
use crate::vdom::{create_node, EventHandler, Props, VNode};

/// Attribute set on the root of every built-in page.
pub const FALLBACK_ATTR: &str = "data-fallback";

pub fn not_found_page(location: &str) -> VNode {
    create_node(
        "section",
        Props::new().with(FALLBACK_ATTR, "not-found"),
        nodes![
            create_node("h1", Props::new(), nodes!["Page not found"]),
            create_node(
                "p",
                Props::new(),
                nodes![format!("Nothing is registered at {}.", location)],
            ),
        ],
    )
}

/// Error page carrying `message` and a button that reloads the current
/// location. The message is a text node, so the host escapes it.
pub fn error_page(message: &str, runtime: WeakRuntime) -> VNode {
    let reload = EventHandler::new(move |_event| {
        let runtime = runtime.clone();
        async move {
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            if let Err(err) = runtime.reload().await {
                tracing::warn!(error = %err, "Reload from error page failed");
            }
        }
    });

    create_node(
        "section",
        Props::new().with(FALLBACK_ATTR, "error"),
        nodes![
            create_node("h1", Props::new(), nodes!["Something went wrong"]),
            create_node("pre", Props::new(), nodes![message]),
            create_node(
                "button",
                Props::new().with("type", "button").on("click", reload),
                nodes!["Reload"],
            ),
        ],
    )
}
