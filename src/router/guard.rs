//! Navigation guards.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;

use crate::runtime::WeakRuntime;

/// What a guard decided about a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    /// Abandon this attempt and navigate to the given location instead.
    Redirect(String),
    /// Abandon this attempt and stay where we are.
    Cancel,
}

/// Per-attempt view of a navigation, handed to every guard.
#[derive(Clone)]
pub struct NavigationContext {
    /// Location committed before this attempt, if any.
    pub from: Option<String>,
    /// Full requested location, query included.
    pub to: String,
    /// Path part of `to`.
    pub path: String,
    /// Route pattern that matched.
    pub route: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub runtime: WeakRuntime,
}

impl NavigationContext {
    pub fn is_authenticated(&self) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|rt| rt.auth().is_authenticated())
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|rt| rt.auth().has_permission(permission))
    }
}

/// Runs before a route renders. `Err` is a hard fault and renders the error
/// screen; redirect and cancel are ordinary outcomes.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, ctx: &NavigationContext) -> anyhow::Result<GuardOutcome>;
}

/// Adapter turning an async closure into a [`Guard`].
pub struct FnGuard<F>(F);

#[async_trait]
impl<F, Fut> Guard for FnGuard<F>
where
    F: Fn(NavigationContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<GuardOutcome>> + Send + 'static,
{
    async fn check(&self, ctx: &NavigationContext) -> anyhow::Result<GuardOutcome> {
        (self.0)(ctx.clone()).await
    }
}

pub fn guard_fn<F, Fut>(f: F) -> FnGuard<F>
where
    F: Fn(NavigationContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<GuardOutcome>> + Send + 'static,
{
    FnGuard(f)
}

/// Redirect anonymous users to `login`.
pub struct RequireAuth {
    login: String,
}

impl RequireAuth {
    pub fn redirect_to(login: &str) -> Self {
        Self {
            login: login.to_string(),
        }
    }
}

#[async_trait]
impl Guard for RequireAuth {
    async fn check(&self, ctx: &NavigationContext) -> anyhow::Result<GuardOutcome> {
        if ctx.is_authenticated() {
            Ok(GuardOutcome::Proceed)
        } else {
            tracing::debug!(to = %ctx.to, login = %self.login, "Anonymous navigation redirected");
            Ok(GuardOutcome::Redirect(self.login.clone()))
        }
    }
}
