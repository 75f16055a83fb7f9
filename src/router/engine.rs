//! Navigation engine.
//!
//! ```text
//! navigate(location)
//!   └─ attempt ──→ lock ──→ no-op check ──→ match ──→ guards ──→ commit ──→ render
//!        │           │            │            │          │
//!        │        Dropped     Unchanged    not found   redirect / cancel / fault
//!        └─ redirects and not-found forwards loop back into `attempt`
//! ```
//!
//! Only one attempt holds the lock at a time. Attempts made while it is held
//! are dropped, not queued. Once the router is stopped, an attempt still in
//! flight gives up before its next commit or render.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use scopeguard::ScopeGuard;
use serde_json::json;

use crate::config::RouterConfig;
use crate::dispatch::{events, HookBus};
use crate::router::error::NavigationError;
use crate::router::fallback::{error_page, not_found_page};
use crate::router::guard::{Guard, GuardOutcome, NavigationContext};
use crate::router::history::History;
use crate::router::location::LocationSource;
use crate::router::pattern::split_location;
use crate::router::route::RouteTable;
use crate::screen::{Screen, ScreenContext, ScreenServices};
use crate::state::InstanceId;
use crate::vdom::{HostNodeId, Props, Reconciler, VNode};

/// How a navigation commits to history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Overwrite the newest history entry instead of pushing.
    pub replace: bool,
    /// Re-render even if the location equals the current one.
    pub force: bool,
}

impl NavigateOptions {
    pub fn replace() -> Self {
        Self {
            replace: true,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Completed,
    /// Another navigation was in flight.
    Dropped,
    /// Already at the requested location.
    Unchanged,
    /// A guard cancelled.
    Cancelled,
    /// A guard redirected and the navigation completed at this location.
    Redirected(String),
    /// Nothing matched; a not-found screen or page was rendered.
    NotFound,
    /// A hard fault; an error screen or page was rendered.
    Failed,
}

enum Step {
    Done(NavigationOutcome),
    Redirect(String),
    NotFound,
}

#[derive(Clone, Copy)]
enum Via {
    Redirect,
    NotFound,
}

struct Mounted {
    route: String,
    location: String,
    instance: InstanceId,
}

#[derive(Default)]
struct Session {
    history: History,
    current: Option<String>,
    mounted: Option<Mounted>,
}

type Lock<'a> = ScopeGuard<&'a AtomicBool, fn(&AtomicBool)>;

fn release(busy: &AtomicBool) {
    busy.store(false, Ordering::Release);
}

/// Everything a router is assembled from.
pub(crate) struct RouterParts {
    pub routes: RouteTable,
    pub screens: HashMap<String, Screen>,
    pub guards: Vec<Arc<dyn Guard>>,
    pub config: RouterConfig,
    pub hooks: HookBus,
    pub reconciler: Reconciler,
    pub location: Arc<dyn LocationSource>,
    pub mount: HostNodeId,
    pub services: ScreenServices,
}

pub struct Router {
    routes: RouteTable,
    screens: HashMap<String, Screen>,
    guards: Vec<Arc<dyn Guard>>,
    config: RouterConfig,
    hooks: HookBus,
    reconciler: Reconciler,
    location: Arc<dyn LocationSource>,
    mount: HostNodeId,
    services: ScreenServices,
    busy: AtomicBool,
    stopped: AtomicBool,
    session: Mutex<Session>,
}

impl Router {
    pub(crate) fn new(parts: RouterParts) -> Self {
        Self {
            routes: parts.routes,
            screens: parts.screens,
            guards: parts.guards,
            config: parts.config,
            hooks: parts.hooks,
            reconciler: parts.reconciler,
            location: parts.location,
            mount: parts.mount,
            services: parts.services,
            busy: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            session: Mutex::new(Session::default()),
        }
    }

    /// Navigate to `location`, following guard redirects and not-found
    /// forwards until the chain settles.
    pub async fn navigate(
        &self,
        location: &str,
        options: NavigateOptions,
    ) -> Result<NavigationOutcome, NavigationError> {
        let mut target = location.to_string();
        let mut options = options;
        let mut redirects = 0;
        let mut via = None;

        loop {
            match self.attempt(&target, options).await? {
                Step::Done(outcome) => {
                    return Ok(match (outcome, via) {
                        (NavigationOutcome::Completed, Some(Via::Redirect)) => {
                            NavigationOutcome::Redirected(target)
                        }
                        (NavigationOutcome::Completed, Some(Via::NotFound)) => {
                            NavigationOutcome::NotFound
                        }
                        (outcome, _) => outcome,
                    });
                }
                Step::Redirect(to) => {
                    redirects += 1;
                    if redirects > self.config.max_redirects {
                        return Err(self.redirect_loop(location, &to).await);
                    }
                    target = to;
                    options.force = false;
                    via = Some(Via::Redirect);
                }
                Step::NotFound => {
                    target = self.config.not_found_path.clone();
                    options.force = true;
                    via = Some(Via::NotFound);
                }
            }
        }
    }

    /// Pop twice and navigate to the second entry popped, or to the root.
    pub async fn back(&self) -> Result<NavigationOutcome, NavigationError> {
        let target = self.session.lock().history.back_target(&self.config.root);
        tracing::debug!(target = %target, "Navigating back");
        self.navigate(&target, NavigateOptions::default()).await
    }

    /// Re-render the current location in place.
    pub async fn reload(&self) -> Result<NavigationOutcome, NavigationError> {
        let target = self.current().unwrap_or_else(|| self.location.current());
        self.navigate(&target, NavigateOptions::replace().forced())
            .await
    }

    /// Location of the last committed navigation.
    pub fn current(&self) -> Option<String> {
        self.session.lock().current.clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.session.lock().history.entries().to_vec()
    }

    /// Instance of the screen currently mounted, if a routed screen is.
    pub fn mounted_instance(&self) -> Option<InstanceId> {
        self.session.lock().mounted.as_ref().map(|m| m.instance)
    }

    pub fn is_navigating(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn mount(&self) -> HostNodeId {
        self.mount
    }

    /// Refuse further commits and renders, including those of an attempt
    /// already past its lock.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn ensure_running(&self) -> Result<(), NavigationError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(NavigationError::Stopped);
        }
        Ok(())
    }

    /// Render into the mount point. A stop that lands while the render is
    /// awaiting its hooks tears the fresh tree down again.
    async fn show(&self, tree: VNode) -> Result<(), NavigationError> {
        self.ensure_running()?;
        self.reconciler.render(tree, self.mount).await?;
        if self.ensure_running().is_err() {
            tracing::debug!(mount = %self.mount, "Stopped during render, unmounting");
            self.unmount();
            return Err(NavigationError::Stopped);
        }
        Ok(())
    }

    /// Tear down whatever is mounted and forget its state.
    pub(crate) fn unmount(&self) {
        if let Some(mounted) = self.session.lock().mounted.take() {
            self.services.store.discard(mounted.instance);
        }
        if let Err(err) = self.reconciler.destroy(self.mount) {
            tracing::debug!(error = %err, "Nothing to unmount");
        }
    }

    fn lock(&self) -> Option<Lock<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(scopeguard::guard(&self.busy, release as fn(&AtomicBool)))
    }

    async fn attempt(
        &self,
        location: &str,
        options: NavigateOptions,
    ) -> Result<Step, NavigationError> {
        if !location.starts_with('/') {
            return Err(NavigationError::InvalidLocation(location.to_string()));
        }
        let Some(_lock) = self.lock() else {
            tracing::debug!(location = %location, "Navigation in flight, dropping attempt");
            return Ok(Step::Done(NavigationOutcome::Dropped));
        };
        self.ensure_running()?;

        let started = Instant::now();
        let from = self.current();
        if !options.force && from.as_deref() == Some(location) {
            tracing::trace!(location = %location, "Already there");
            return Ok(Step::Done(NavigationOutcome::Unchanged));
        }

        self.hooks
            .emit(
                events::NAVIGATION_START,
                json!({ "from": from, "to": location }),
            )
            .await;

        let (path, query) = split_location(location);
        let Some(matched) = self.routes.find(path) else {
            return self.unmatched(location, path, from, options).await;
        };
        let route = matched.route;
        let ctx = NavigationContext {
            from: from.clone(),
            to: location.to_string(),
            path: path.to_string(),
            route: route.pattern.as_str().to_string(),
            params: matched.params,
            query,
            runtime: self.services.runtime.clone(),
        };

        for guard in self.guards.iter().chain(route.definition.guards.iter()) {
            match guard.check(&ctx).await {
                Ok(GuardOutcome::Proceed) => {}
                Ok(GuardOutcome::Redirect(to)) => {
                    tracing::info!(from = %location, to = %to, "Navigation redirected");
                    self.hooks
                        .emit(
                            events::NAVIGATION_REDIRECT,
                            json!({ "from": location, "to": to }),
                        )
                        .await;
                    return Ok(Step::Redirect(to));
                }
                Ok(GuardOutcome::Cancel) => {
                    tracing::debug!(to = %location, "Navigation cancelled by guard");
                    self.hooks
                        .emit(
                            events::NAVIGATION_CANCELLED,
                            json!({ "from": from, "to": location }),
                        )
                        .await;
                    return Ok(Step::Done(NavigationOutcome::Cancelled));
                }
                Err(err) => return self.fail(location, err).await.map(Step::Done),
            }
        }

        self.ensure_running()?;
        self.commit(location, options.replace);
        let instance = self.instance_for(&ctx.route, location);

        let Some(screen) = self.screens.get(&route.definition.screen) else {
            let err = anyhow::anyhow!("screen '{}' is not registered", route.definition.screen);
            return self.fail(location, err).await.map(Step::Done);
        };
        let mut props = route.definition.props.clone();
        for (name, value) in &ctx.params {
            props.insert(name, value.as_str().into());
        }
        let props = props.with("location", location);

        let rendered = {
            let screen_ctx = ScreenContext::new(
                location.to_string(),
                props,
                ctx.params.clone(),
                ctx.query.clone(),
                instance,
                &self.services,
            );
            screen(&screen_ctx)
        };
        let tree = match rendered {
            Ok(tree) => tree,
            Err(err) => return self.fail(location, err).await.map(Step::Done),
        };
        match self.show(tree).await {
            Ok(()) => {}
            Err(NavigationError::Render(err)) => {
                return self.fail(location, err.into()).await.map(Step::Done);
            }
            Err(err) => return Err(err),
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(to = %location, route = %ctx.route, elapsed_ms, "Navigation complete");
        self.hooks
            .emit(
                events::NAVIGATION_COMPLETE,
                json!({
                    "from": from,
                    "to": location,
                    "route": ctx.route,
                    "elapsed_ms": elapsed_ms,
                }),
            )
            .await;
        Ok(Step::Done(NavigationOutcome::Completed))
    }

    /// No route matched `path`. Forward to the not-found route if one is
    /// registered, otherwise render the built-in page here.
    async fn unmatched(
        &self,
        location: &str,
        path: &str,
        from: Option<String>,
        options: NavigateOptions,
    ) -> Result<Step, NavigationError> {
        tracing::warn!(location = %location, "No route matched");
        self.hooks
            .emit(
                events::NAVIGATION_NOT_FOUND,
                json!({ "from": from, "to": location }),
            )
            .await;

        let not_found = self.config.not_found_path.as_str();
        if path != not_found && self.routes.find(not_found).is_some() {
            return Ok(Step::NotFound);
        }

        self.ensure_running()?;
        self.commit(location, options.replace);
        self.forget_mounted();
        self.show(not_found_page(location)).await?;
        Ok(Step::Done(NavigationOutcome::NotFound))
    }

    /// Report a hard fault and render the error screen in place.
    async fn fail(
        &self,
        location: &str,
        err: anyhow::Error,
    ) -> Result<NavigationOutcome, NavigationError> {
        let message = format!("{:#}", err);
        tracing::error!(location = %location, error = %message, "Navigation failed");
        self.hooks
            .emit(
                events::NAVIGATION_ERROR,
                json!({ "to": location, "error": message }),
            )
            .await;

        self.ensure_running()?;
        let tree = self.error_tree(location, &message);
        self.forget_mounted();
        self.show(tree).await?;
        Ok(NavigationOutcome::Failed)
    }

    async fn redirect_loop(&self, origin: &str, last: &str) -> NavigationError {
        let limit = self.config.max_redirects;
        let err = NavigationError::RedirectLoop {
            from: origin.to_string(),
            limit,
        };
        match self.lock() {
            Some(_lock) => {
                if let Err(render_err) = self.fail(last, anyhow::Error::msg(err.to_string())).await {
                    tracing::error!(error = %render_err, "Could not render error page");
                }
            }
            None => tracing::error!(from = %origin, limit, "Redirect loop"),
        }
        err
    }

    /// The registered error-route screen, or the built-in page if there is
    /// none or it fails too. Its state lives only for this one call.
    fn error_tree(&self, location: &str, message: &str) -> VNode {
        let registered = self
            .routes
            .find(&self.config.error_path)
            .and_then(|m| {
                self.screens
                    .get(&m.route.definition.screen)
                    .map(|screen| (m, screen))
            });

        if let Some((matched, screen)) = registered {
            let props: Props = matched
                .route
                .definition
                .props
                .clone()
                .with("error", message)
                .with("location", location);
            let instance = InstanceId::new();
            self.services.store.open(instance);
            let rendered = {
                let ctx = ScreenContext::new(
                    location.to_string(),
                    props,
                    matched.params,
                    BTreeMap::new(),
                    instance,
                    &self.services,
                );
                screen(&ctx)
            };
            self.services.store.discard(instance);
            match rendered {
                Ok(tree) => return tree,
                Err(err) => {
                    tracing::error!(error = %format!("{:#}", err), "Error screen failed");
                }
            }
        }
        error_page(message, self.services.runtime.clone())
    }

    fn commit(&self, location: &str, replace: bool) {
        {
            let mut session = self.session.lock();
            session.history.commit(location, replace);
            session.current = Some(location.to_string());
        }
        self.location.set_silently(location);
    }

    /// Reuse the mounted instance for the same route and location; otherwise
    /// start a new one and drop the previous instance's state.
    fn instance_for(&self, route: &str, location: &str) -> InstanceId {
        let mut session = self.session.lock();
        if let Some(mounted) = &session.mounted {
            if mounted.route == route && mounted.location == location {
                return mounted.instance;
            }
        }

        let instance = InstanceId::new();
        self.services.store.open(instance);
        let previous = session.mounted.replace(Mounted {
            route: route.to_string(),
            location: location.to_string(),
            instance,
        });
        drop(session);

        if let Some(previous) = previous {
            let dropped = self.services.store.discard(previous.instance);
            tracing::debug!(instance = %previous.instance, slots = dropped, "Screen state discarded");
        }
        instance
    }

    fn forget_mounted(&self) {
        let previous = self.session.lock().mounted.take();
        if let Some(previous) = previous {
            self.services.store.discard(previous.instance);
        }
    }
}
