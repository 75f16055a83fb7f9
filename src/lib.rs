//! weft: a client-side UI runtime.
//!
//! ```text
//! location ──→ router ──→ guards ──→ screen(ctx) ──→ VNode ──→ reconciler ──→ host tree
//!                 │                      │                          │
//!                 └──── hooks ◄──────────┴──── state updates ───────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod screen;
pub mod state;
pub mod storage;
pub mod vdom;

pub use runtime::{Runtime, RuntimeBuilder, RuntimeError, WeakRuntime};
