use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};

use weft::config::{ConfigStore, RuntimeConfig};
use weft::dispatch::{events, hook_fn, Plugin, PluginContext, PluginOptions};
use weft::nodes;
use weft::router::{RequireAuth, RouteDefinition};
use weft::screen::{MapTranslator, ScreenContext, SessionAuth};
use weft::vdom::{create_node, EventHandler, MemoryHost, Props, VNode};
use weft::{Runtime, WeakRuntime};

/// Render one location of the bundled demo app and print the HTML.
#[derive(Debug, Parser)]
#[command(name = "weft", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Location to render
    #[arg(long, default_value = "/")]
    location: String,

    /// Log as JSON lines
    #[arg(long)]
    json_log: bool,

    /// Render as a signed-in user
    #[arg(long)]
    signed_in: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(RuntimeConfig::config_path);
    let config = RuntimeConfig::load_from(&path)?;
    let store = ConfigStore::new(config, path);
    let mut config = store.get();
    if cli.json_log {
        config.logging.json = true;
    }
    weft::logging::init(&config.logging);
    tracing::debug!(path = %store.path().display(), "Config loaded");

    let host = MemoryHost::new();
    let mount = host.create_mount("main");
    let auth = SessionAuth::new();
    if cli.signed_in {
        auth.sign_in(["items:edit"]);
    }

    let runtime = demo_app(host.clone(), mount, config, auth)?;
    runtime
        .plugins()
        .register("nav-log", NavigationLog, PluginOptions::default())?;
    runtime.location().set_silently(&cli.location);

    let outcome = runtime.start().await.context("start failed")?;
    tracing::info!(outcome = ?outcome, location = ?runtime.current(), "Rendered");

    println!("{}", host.inner_html(mount));
    runtime.shutdown().await;
    Ok(())
}

fn demo_app(
    host: MemoryHost,
    mount: weft::vdom::HostNodeId,
    config: RuntimeConfig,
    auth: SessionAuth,
) -> Result<Runtime, weft::RuntimeError> {
    let translator = MapTranslator::new()
        .with("home.title", "Inventory")
        .with("login.title", "Sign in required");

    Runtime::builder(host, mount)
        .config(config)
        .translator(translator)
        .auth(auth)
        .screen("home", home_screen)
        .screen("item", item_screen)
        .screen("login", |ctx: &ScreenContext| {
            Ok(create_node("h1", Props::new(), nodes![ctx.translate("login.title")]))
        })
        .route(RouteDefinition::new("/", "home"))
        .route(
            RouteDefinition::new("/item/:id", "item")
                .prop("section", "inventory")
                .guard(RequireAuth::redirect_to("/login")),
        )
        .route(RouteDefinition::new("/login", "login"))
        .build()
}

fn home_screen(ctx: &ScreenContext) -> anyhow::Result<VNode> {
    let counter = ctx.use_state(json!({ "count": 0 }));
    let count = counter.get()["count"].as_i64().unwrap_or(0);

    let increment = EventHandler::new(move |_event| {
        let counter = counter.clone();
        async move {
            let result = counter
                .update(|v| json!({ "count": v["count"].as_i64().unwrap_or(0) + 1 }))
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "Counter update failed");
            }
        }
    });

    let items = (1..=3)
        .map(|i| {
            create_node(
                "li",
                Props::new().key(i.to_string()),
                nodes![create_node(
                    "a",
                    Props::new().with("href", format!("/item/{}", i)),
                    nodes![format!("Item {}", i)],
                )],
            )
        })
        .collect::<Vec<_>>();

    Ok(create_node(
        "div",
        Props::new().with("class", "home"),
        nodes![
            create_node("h1", Props::new(), nodes![ctx.translate("home.title")]),
            create_node("ul", Props::new(), nodes![items]),
            create_node(
                "button",
                Props::new().on("click", increment),
                nodes![format!("Clicked {} times", count)],
            ),
        ],
    ))
}

fn item_screen(ctx: &ScreenContext) -> anyhow::Result<VNode> {
    let id = ctx.param("id").context("missing item id")?;
    Ok(create_node(
        "article",
        Props::new().with("data-item", id),
        nodes![
            create_node("h1", Props::new(), nodes![format!("Item {}", id)]),
            ctx.has_permission("items:edit")
                .then(|| create_node("button", Props::new(), nodes!["Edit"])),
        ],
    ))
}

/// Logs every completed navigation.
struct NavigationLog;

#[async_trait]
impl Plugin<WeakRuntime> for NavigationLog {
    async fn init(&self, ctx: &PluginContext<WeakRuntime>) -> anyhow::Result<()> {
        let runtime = ctx.host.clone();
        ctx.hooks.on_owned(
            &ctx.name,
            events::NAVIGATION_COMPLETE,
            hook_fn(move |event| {
                let runtime = runtime.clone();
                async move {
                    let history = runtime
                        .upgrade()
                        .map(|rt| rt.history().len())
                        .unwrap_or(0);
                    tracing::info!(
                        to = %event.payload["to"],
                        elapsed_ms = %event.payload["elapsed_ms"],
                        history,
                        "Navigated"
                    );
                    Ok(Value::Null)
                }
            }),
            None,
        );
        Ok(())
    }
}
