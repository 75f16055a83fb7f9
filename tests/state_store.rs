mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use weft::dispatch::{events, hook_fn};
use weft::nodes;
use weft::router::{NavigationError, NavigationOutcome, RouteDefinition};
use weft::screen::ScreenContext;
use weft::state::{StateHandle, StateUpdate};
use weft::vdom::{create_node, EventHandler, Props};
use weft::Runtime;

use common::Harness;

/// Counter screen that exposes its state handle for the test to drive.
fn counter_app(handle: Arc<Mutex<Option<StateHandle>>>) -> (Runtime, Harness) {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("counter", move |ctx: &ScreenContext| {
            let state = ctx.use_state(json!({ "count": 0, "label": "clicks" }));
            let value = state.get();
            *handle.lock() = Some(state.clone());

            let click = EventHandler::new(move |_event| {
                let state = state.clone();
                async move {
                    let _ = state
                        .update(|v| {
                            let mut next = v.clone();
                            next["count"] = json!(v["count"].as_i64().unwrap_or(0) + 1);
                            next
                        })
                        .await;
                }
            });

            Ok(create_node(
                "button",
                Props::new().on("click", click),
                nodes![format!("{} {}", value["label"].as_str().unwrap_or(""), value["count"])],
            ))
        })
        .screen("other", common::label("other"))
        .route(RouteDefinition::new("/", "counter"))
        .route(RouteDefinition::new("/other", "other"))
        .build()
        .unwrap();
    (runtime, harness)
}

fn current(handle: &Arc<Mutex<Option<StateHandle>>>) -> StateHandle {
    handle.lock().clone().unwrap()
}

#[tokio::test]
async fn test_click_updates_state_and_rerenders() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    assert_eq!(harness.html(), "<button>clicks 0</button>");

    let button = harness.host.children(harness.mount)[0];
    assert!(harness.host.dispatch(button, "click", None).await);
    assert!(harness.host.dispatch(button, "click", None).await);

    assert_eq!(harness.html(), "<button>clicks 2</button>");
    assert_eq!(harness.host.children(harness.mount)[0], button);
    assert_eq!(runtime.history(), vec!["/"]);
}

#[tokio::test]
async fn test_merge_keeps_untouched_keys() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();

    let outcome = current(&handle).set(json!({ "count": 5 })).await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(current(&handle).get(), json!({ "count": 5, "label": "clicks" }));
    assert_eq!(harness.html(), "<button>clicks 5</button>");
}

#[tokio::test]
async fn test_state_hooks_carry_before_and_after() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, _harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    let log = common::record(
        runtime.hooks(),
        &[events::STATE_BEFORE_CHANGE, events::STATE_CHANGE],
    );

    let state = current(&handle);
    state
        .apply(StateUpdate::produce(|_| json!({ "count": 1 })))
        .await
        .unwrap();

    assert_eq!(
        common::names(&log),
        vec![events::STATE_BEFORE_CHANGE, events::STATE_CHANGE]
    );
    let (_, payload) = &log.lock()[1];
    assert_eq!(payload["instance"], state.instance().to_string());
    assert_eq!(payload["slot"], 0);
    assert_eq!(payload["before"], json!({ "count": 0, "label": "clicks" }));
    assert_eq!(payload["after"], json!({ "count": 1 }));
}

#[tokio::test]
async fn test_reload_keeps_instance_and_leaving_discards_it() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();

    current(&handle).set(json!({ "count": 3 })).await.unwrap();
    let first = current(&handle).instance();
    runtime.reload().await.unwrap();
    assert_eq!(current(&handle).instance(), first);
    assert_eq!(harness.html(), "<button>clicks 3</button>");

    runtime.navigate("/other").await.unwrap();
    assert!(runtime.state().get(first, 0).is_none());
    assert!(runtime.state().is_empty());

    runtime.navigate("/").await.unwrap();
    assert_ne!(current(&handle).instance(), first);
    assert_eq!(harness.html(), "<button>clicks 0</button>");
}

#[tokio::test]
async fn test_slots_follow_call_order() {
    let (builder, harness) = common::builder();
    let runtime = builder
        .screen("form", |ctx: &ScreenContext| {
            let name = ctx.use_state(json!("anon"));
            let visits = ctx.use_state_with(|| json!(1));
            Ok(create_node(
                "p",
                Props::new(),
                nodes![format!("{}:{} {}:{}", name.slot(), name.get(), visits.slot(), visits.get())],
            ))
        })
        .route(RouteDefinition::new("/", "form"))
        .build()
        .unwrap();

    runtime.start().await.unwrap();
    assert_eq!(harness.html(), "<p>0:&quot;anon&quot; 1:1</p>");
}

#[tokio::test]
async fn test_update_after_shutdown_reports_stopped() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, _harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    let state = current(&handle);

    runtime.shutdown().await;

    let err = state.set(json!({ "count": 9 })).await.unwrap_err();
    assert!(matches!(err, NavigationError::Stopped));
}

#[tokio::test]
async fn test_update_with_runtime_dropped_still_stores() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, _harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    let state = current(&handle);
    drop(runtime);

    let err = state.set(json!({ "count": 4 })).await.unwrap_err();

    assert!(matches!(err, NavigationError::Stopped));
    assert_eq!(state.get()["count"], 4);
}

#[tokio::test]
async fn test_update_during_navigation_is_dropped_but_stored() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, harness) = counter_app(handle.clone());
    let outcome: Arc<Mutex<Option<NavigationOutcome>>> = Arc::new(Mutex::new(None));

    let seen = outcome.clone();
    let slot = handle.clone();
    runtime.hooks().on(
        events::RENDER_COMPLETE,
        hook_fn(move |_| {
            let seen = seen.clone();
            let state = slot.lock().clone();
            async move {
                let done = seen.lock().is_some();
                if done {
                    return Ok(Value::Null);
                }
                if let Some(state) = state {
                    let result = state.set(json!({ "count": 7 })).await?;
                    *seen.lock() = Some(result);
                }
                Ok(Value::Null)
            }
        }),
        None,
    );

    runtime.start().await.unwrap();

    assert_eq!(*outcome.lock(), Some(NavigationOutcome::Dropped));
    assert_eq!(harness.html(), "<button>clicks 0</button>");
    assert_eq!(current(&handle).get()["count"], 7);

    runtime.reload().await.unwrap();
    assert_eq!(harness.html(), "<button>clicks 7</button>");
}

#[tokio::test]
async fn test_overlapping_merges_both_land() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, _harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    runtime.hooks().on(
        events::STATE_BEFORE_CHANGE,
        hook_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Value::Null)
        }),
        None,
    );

    let first = current(&handle);
    let second = first.clone();
    let (a, b) = tokio::join!(first.set(json!({ "b": 2 })), second.set(json!({ "c": 3 })));
    a.unwrap();
    b.unwrap();

    assert_eq!(
        current(&handle).get(),
        json!({ "count": 0, "label": "clicks", "b": 2, "c": 3 })
    );
}

#[tokio::test]
async fn test_stale_handle_after_leaving_is_ignored() {
    let handle = Arc::new(Mutex::new(None));
    let (runtime, harness) = counter_app(handle.clone());
    runtime.start().await.unwrap();
    let stale = current(&handle);
    runtime.navigate("/other").await.unwrap();
    let log = common::record(runtime.hooks(), &[events::STATE_CHANGE, events::RENDER_BEFORE]);

    let outcome = stale.set(json!({ "count": 5 })).await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Unchanged);
    assert!(runtime.state().is_empty());
    assert!(stale.get().is_null());
    assert!(log.lock().is_empty());
    assert_eq!(harness.html(), "<p>other</p>");
}
