mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use weft::config::RuntimeConfig;
use weft::dispatch::events;
use weft::nodes;
use weft::router::{
    guard_fn, GuardOutcome, LocationSource, NavigationError, NavigationOutcome, RequireAuth,
    RouteDefinition, FALLBACK_ATTR,
};
use weft::screen::{ScreenContext, SessionAuth};
use weft::vdom::{create_node, Props};
use weft::Runtime;

use common::Harness;

/// Home, two plain pages and a parameterized user page.
fn app() -> (Runtime, Harness) {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("home", common::label("home"))
        .screen("a", common::label("a"))
        .screen("b", common::label("b"))
        .screen("user", |ctx: &ScreenContext| {
            let id = ctx.param("id").unwrap_or("?");
            let tab = ctx.query.get("tab").map(String::as_str).unwrap_or("none");
            Ok(create_node(
                "p",
                Props::new(),
                nodes![format!("user {} tab {}", id, tab)],
            ))
        })
        .route(RouteDefinition::new("/", "home"))
        .route(RouteDefinition::new("/a", "a"))
        .route(RouteDefinition::new("/b", "b"))
        .route(RouteDefinition::new("/users/:id", "user"))
        .build()
        .unwrap();
    (runtime, harness)
}

#[tokio::test]
async fn test_start_renders_initial_location() {
    let (runtime, harness) = app();
    let log = common::record(runtime.hooks(), &[events::APP_READY]);

    let outcome = runtime.start().await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(harness.html(), "<p>home</p>");
    assert_eq!(runtime.current().as_deref(), Some("/"));
    assert_eq!(common::names(&log), vec![events::APP_READY]);
}

#[tokio::test]
async fn test_params_and_query_reach_screen() {
    let (runtime, harness) = app();
    runtime.navigate("/users/42?tab=posts").await.unwrap();

    assert_eq!(harness.html(), "<p>user 42 tab posts</p>");
    assert_eq!(harness.location.current(), "/users/42?tab=posts");
}

#[tokio::test]
async fn test_encoded_params_and_query_are_decoded() {
    let (runtime, harness) = app();
    runtime.navigate("/users/ada%20l?tab=open+issues").await.unwrap();

    assert_eq!(harness.html(), "<p>user ada l tab open issues</p>");
    assert_eq!(runtime.current().as_deref(), Some("/users/ada%20l?tab=open+issues"));
}

#[tokio::test]
async fn test_literal_route_wins_over_pattern() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("user", common::label("user"))
        .screen("new", common::label("new user form"))
        .route(RouteDefinition::new("/users/:id", "user"))
        .route(RouteDefinition::new("/users/new", "new"))
        .build()
        .unwrap();

    runtime.navigate("/users/new").await.unwrap();
    assert_eq!(harness.html(), "<p>new user form</p>");

    runtime.navigate("/users/7").await.unwrap();
    assert_eq!(harness.html(), "<p>user</p>");
}

#[tokio::test]
async fn test_same_location_is_unchanged_unless_forced() {
    let (runtime, _harness) = app();
    let log = common::record(runtime.hooks(), &[events::NAVIGATION_START]);

    runtime.navigate("/a").await.unwrap();
    assert_eq!(
        runtime.navigate("/a").await.unwrap(),
        NavigationOutcome::Unchanged
    );
    assert_eq!(runtime.reload().await.unwrap(), NavigationOutcome::Completed);

    assert_eq!(log.lock().len(), 2);
    assert_eq!(runtime.history(), vec!["/a"]);
}

#[tokio::test]
async fn test_navigation_during_navigation_is_dropped() {
    let (builder, harness) = common::builder();
    let nested = Arc::new(Mutex::new(None));

    let seen = nested.clone();
    let runtime = builder
        .screen("home", common::label("home"))
        .screen("slow", common::label("slow"))
        .screen("other", common::label("other"))
        .route(RouteDefinition::new("/", "home"))
        .route(RouteDefinition::new("/other", "other"))
        .route(RouteDefinition::new("/slow", "slow").guard(guard_fn(move |ctx| {
            let seen = seen.clone();
            async move {
                if let Some(runtime) = ctx.runtime.upgrade() {
                    let outcome = runtime.navigate("/other").await?;
                    *seen.lock() = Some(outcome);
                }
                Ok(GuardOutcome::Proceed)
            }
        })))
        .build()
        .unwrap();

    let outcome = runtime.navigate("/slow").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(*nested.lock(), Some(NavigationOutcome::Dropped));
    assert_eq!(harness.html(), "<p>slow</p>");
    assert_eq!(runtime.history(), vec!["/slow"]);
    assert!(!runtime.router().is_navigating());
}

#[tokio::test]
async fn test_back_pops_twice_and_pushes_target() {
    let (runtime, harness) = app();
    runtime.start().await.unwrap();
    runtime.navigate("/a").await.unwrap();
    runtime.navigate("/b").await.unwrap();

    let outcome = runtime.back().await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(harness.html(), "<p>a</p>");
    assert_eq!(runtime.history(), vec!["/", "/a"]);
}

#[tokio::test]
async fn test_back_on_short_history_goes_to_root() {
    let (runtime, harness) = app();
    runtime.navigate("/a").await.unwrap();

    runtime.back().await.unwrap();

    assert_eq!(harness.html(), "<p>home</p>");
    assert_eq!(runtime.history(), vec!["/"]);
}

#[tokio::test]
async fn test_replace_overwrites_newest_entry() {
    let (runtime, _harness) = app();
    runtime.navigate("/a").await.unwrap();
    runtime.replace("/b").await.unwrap();

    assert_eq!(runtime.history(), vec!["/b"]);
    assert_eq!(runtime.current().as_deref(), Some("/b"));
}

#[tokio::test]
async fn test_anonymous_user_is_redirected_to_login() {
    let (builder, harness) = common::builder();
    let auth = SessionAuth::new();
    let runtime = builder
        .auth(auth.clone())
        .screen("login", common::label("login"))
        .screen("account", common::label("account"))
        .route(RouteDefinition::new("/login", "login"))
        .route(RouteDefinition::new("/account", "account").guard(RequireAuth::redirect_to("/login")))
        .build()
        .unwrap();
    let log = common::record(
        runtime.hooks(),
        &[events::NAVIGATION_REDIRECT, events::NAVIGATION_COMPLETE],
    );

    let outcome = runtime.navigate("/account").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Redirected("/login".to_string()));
    assert_eq!(harness.html(), "<p>login</p>");
    assert_eq!(runtime.history(), vec!["/login"]);
    assert_eq!(
        common::names(&log),
        vec![events::NAVIGATION_REDIRECT, events::NAVIGATION_COMPLETE]
    );
    assert_eq!(log.lock()[0].1, json!({ "from": "/account", "to": "/login" }));

    auth.sign_in(["account:read"]);
    assert_eq!(
        runtime.navigate("/account").await.unwrap(),
        NavigationOutcome::Completed
    );
    assert_eq!(harness.html(), "<p>account</p>");
}

#[tokio::test]
async fn test_cancelling_guard_keeps_current_screen() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("home", common::label("home"))
        .screen("locked", common::label("locked"))
        .route(RouteDefinition::new("/", "home"))
        .route(
            RouteDefinition::new("/locked", "locked")
                .guard(guard_fn(|_| async { Ok(GuardOutcome::Cancel) })),
        )
        .build()
        .unwrap();
    runtime.start().await.unwrap();
    let log = common::record(runtime.hooks(), &[events::NAVIGATION_CANCELLED]);

    let outcome = runtime.navigate("/locked").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Cancelled);
    assert_eq!(harness.html(), "<p>home</p>");
    assert_eq!(runtime.history(), vec!["/"]);
    assert_eq!(log.lock().len(), 1);
}

#[tokio::test]
async fn test_global_guards_run_before_route_guards() {
    let (builder, _harness) = common::builder();
    let order = Arc::new(Mutex::new(Vec::new()));

    let global = order.clone();
    let local = order.clone();
    let runtime = builder
        .screen("page", common::label("page"))
        .guard(guard_fn(move |ctx| {
            let global = global.clone();
            async move {
                global.lock().push(format!("global {}", ctx.route));
                Ok(GuardOutcome::Proceed)
            }
        }))
        .route(RouteDefinition::new("/p/:n", "page").guard(guard_fn(move |ctx| {
            let local = local.clone();
            async move {
                local.lock().push(format!("route {}", ctx.params["n"]));
                Ok(GuardOutcome::Proceed)
            }
        })))
        .build()
        .unwrap();

    runtime.navigate("/p/3").await.unwrap();
    assert_eq!(*order.lock(), vec!["global /p/:n", "route 3"]);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let (builder, harness) = common::builder();
    let mut config = RuntimeConfig::default();
    config.router.max_redirects = 3;
    let runtime = builder
        .config(config)
        .screen("ping", common::label("ping"))
        .screen("pong", common::label("pong"))
        .route(RouteDefinition::new("/ping", "ping").guard(guard_fn(|_| async {
            Ok(GuardOutcome::Redirect("/pong".to_string()))
        })))
        .route(RouteDefinition::new("/pong", "pong").guard(guard_fn(|_| async {
            Ok(GuardOutcome::Redirect("/ping".to_string()))
        })))
        .build()
        .unwrap();

    let err = runtime.navigate("/ping").await.unwrap_err();

    assert!(matches!(
        err,
        NavigationError::RedirectLoop { ref from, limit: 3 } if from == "/ping"
    ));
    assert!(harness
        .host
        .find_by_attr(harness.mount, FALLBACK_ATTR, "error")
        .is_some());
    assert!(!runtime.router().is_navigating());
}

#[tokio::test]
async fn test_unmatched_location_renders_builtin_not_found() {
    let (runtime, harness) = app();
    let log = common::record(runtime.hooks(), &[events::NAVIGATION_NOT_FOUND]);

    let outcome = runtime.navigate("/nowhere").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::NotFound);
    assert!(harness
        .host
        .find_by_attr(harness.mount, FALLBACK_ATTR, "not-found")
        .is_some());
    assert!(harness.html().contains("/nowhere"));
    assert_eq!(runtime.history(), vec!["/nowhere"]);
    assert_eq!(log.lock()[0].1["to"], "/nowhere");
}

#[tokio::test]
async fn test_unmatched_location_forwards_to_registered_not_found() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("missing", |ctx: &ScreenContext| {
            Ok(create_node("h1", Props::new(), nodes![format!("404 at {}", ctx.location)]))
        })
        .route(RouteDefinition::new("/404", "missing"))
        .build()
        .unwrap();

    let outcome = runtime.navigate("/gone").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::NotFound);
    assert_eq!(harness.html(), "<h1>404 at /404</h1>");
    assert_eq!(runtime.current().as_deref(), Some("/404"));
}

#[tokio::test]
async fn test_guard_fault_renders_escaped_error_page() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("home", common::label("home"))
        .screen("broken", common::label("never shown"))
        .route(RouteDefinition::new("/", "home"))
        .route(RouteDefinition::new("/broken", "broken").guard(guard_fn(|_| async {
            anyhow::bail!("<b>session store unreachable</b>")
        })))
        .build()
        .unwrap();
    runtime.start().await.unwrap();
    let log = common::record(runtime.hooks(), &[events::NAVIGATION_ERROR]);

    let outcome = runtime.navigate("/broken").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Failed);
    let html = harness.html();
    assert!(html.contains("&lt;b&gt;session store unreachable&lt;/b&gt;"));
    assert!(!html.contains("never shown"));
    assert_eq!(runtime.history(), vec!["/"]);
    assert_eq!(log.lock()[0].1["to"], "/broken");
}

#[tokio::test]
async fn test_error_page_reload_button_recovers() {
    let (builder, harness) = common::builder();
    let healthy = Arc::new(Mutex::new(false));

    let flag = healthy.clone();
    let runtime = builder
        .screen("flaky", move |_ctx: &ScreenContext| {
            if *flag.lock() {
                Ok(create_node("p", Props::new(), nodes!["recovered"]))
            } else {
                anyhow::bail!("backend down")
            }
        })
        .route(RouteDefinition::new("/", "flaky"))
        .build()
        .unwrap();

    assert_eq!(runtime.start().await.unwrap(), NavigationOutcome::Failed);
    *healthy.lock() = true;

    let button = harness.host.children(
        harness
            .host
            .find_by_attr(harness.mount, FALLBACK_ATTR, "error")
            .unwrap(),
    )[2];
    assert!(harness.host.dispatch(button, "click", None).await);

    assert_eq!(harness.html(), "<p>recovered</p>");
}

#[tokio::test]
async fn test_screen_fault_uses_registered_error_route() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("broken", |_ctx: &ScreenContext| anyhow::bail!("template missing"))
        .screen("oops", |ctx: &ScreenContext| {
            let error = ctx.props.text("error").unwrap_or_default().to_string();
            let at = ctx.props.text("location").unwrap_or_default().to_string();
            Ok(create_node("div", Props::new(), nodes![format!("{} @ {}", error, at)]))
        })
        .route(RouteDefinition::new("/broken", "broken"))
        .route(RouteDefinition::new("/500", "oops"))
        .build()
        .unwrap();

    let outcome = runtime.navigate("/broken").await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Failed);
    assert_eq!(harness.html(), "<div>template missing @ /broken</div>");
    assert!(runtime.router().mounted_instance().is_none());
    assert!(runtime.state().is_empty());
}

#[tokio::test]
async fn test_relative_location_is_rejected() {
    let (runtime, _harness) = app();
    let err = runtime.navigate("a").await.unwrap_err();
    assert!(matches!(err, NavigationError::InvalidLocation(ref l) if l == "a"));
}

#[tokio::test]
async fn test_listen_follows_external_location_changes() {
    let (runtime, harness) = app();
    runtime.start().await.unwrap();
    runtime.listen();

    harness.location.change("/b");

    for _ in 0..50 {
        if runtime.current().as_deref() == Some("/b") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.html(), "<p>b</p>");
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_navigation_and_unmounts() {
    let (runtime, harness) = app();
    let log = common::record(runtime.hooks(), &[events::APP_SHUTDOWN]);
    runtime.start().await.unwrap();

    runtime.shutdown().await;
    runtime.shutdown().await;

    assert!(runtime.is_stopped());
    assert_eq!(harness.html(), "");
    assert_eq!(log.lock().len(), 1);
    assert!(matches!(
        runtime.navigate("/a").await,
        Err(NavigationError::Stopped)
    ));
    assert!(matches!(runtime.back().await, Err(NavigationError::Stopped)));
}

#[tokio::test]
async fn test_shutdown_during_guard_abandons_navigation() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("slow", common::label("slow"))
        .route(RouteDefinition::new("/slow", "slow").guard(guard_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(GuardOutcome::Proceed)
        })))
        .build()
        .unwrap();

    let pending = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.navigate("/slow").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    runtime.shutdown().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(NavigationError::Stopped)));
    assert_eq!(harness.html(), "");
    assert!(runtime.history().is_empty());
    assert!(runtime.current().is_none());
    assert!(!runtime.router().reconciler().is_mounted(harness.mount));
}
