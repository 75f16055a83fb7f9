//! Shared test utilities: in-memory apps, hook recorders and plugins.

#![allow(dead_code, unused_imports)]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;

use weft::dispatch::{hook_fn, HookBus, Plugin, PluginContext};
use weft::nodes;
use weft::router::MemoryLocation;
use weft::screen::ScreenContext;
use weft::vdom::{create_node, HostNodeId, MemoryHost, Props, VNode};
use weft::{Runtime, RuntimeBuilder, WeakRuntime};

pub type Log = Arc<Mutex<Vec<String>>>;
pub type EventLog = Arc<Mutex<Vec<(String, Value)>>>;

/// Pieces of a runtime under test that the runtime itself does not expose
/// concretely.
pub struct Harness {
    pub host: MemoryHost,
    pub mount: HostNodeId,
    pub location: MemoryLocation,
}

impl Harness {
    pub fn html(&self) -> String {
        self.host.inner_html(self.mount)
    }
}

/// Builder over a fresh `MemoryHost` mounted at `<main>`, starting at `/`.
pub fn builder() -> (RuntimeBuilder, Harness) {
    let host = MemoryHost::new();
    let mount = host.create_mount("main");
    let location = MemoryLocation::new("/");
    let builder = Runtime::builder(host.clone(), mount).location(location.clone());
    (
        builder,
        Harness {
            host,
            mount,
            location,
        },
    )
}

/// Screen rendering `<p>{label}</p>`.
pub fn label(text: &'static str) -> impl Fn(&ScreenContext) -> anyhow::Result<VNode> + Send + Sync + 'static {
    move |_ctx: &ScreenContext| Ok(create_node("p", Props::new(), nodes![text]))
}

/// Record every emission of `hooks` on `bus` as `(hook, payload)`.
pub fn record(bus: &HookBus, hooks: &[&str]) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    for hook in hooks {
        let sink = log.clone();
        bus.on(
            hook,
            hook_fn(move |event| {
                let sink = sink.clone();
                async move {
                    sink.lock().push((event.name, event.payload));
                    Ok(Value::Null)
                }
            }),
            None,
        );
    }
    log
}

/// Names of the recorded hooks, in order.
pub fn names(log: &EventLog) -> Vec<String> {
    log.lock().iter().map(|(name, _)| name.clone()).collect()
}

/// Plugin that appends its name to a shared log on init and destroy, and
/// optionally fails its init.
pub struct RecordingPlugin {
    pub name: &'static str,
    pub log: Log,
    pub fail: bool,
}

impl RecordingPlugin {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            fail: false,
        }
    }

    pub fn failing(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            fail: true,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Plugin<C> for RecordingPlugin {
    async fn init(&self, _ctx: &PluginContext<C>) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("{} refused to start", self.name);
        }
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }

    async fn destroy(&self, _ctx: &PluginContext<C>) -> anyhow::Result<()> {
        self.log.lock().push(format!("destroy:{}", self.name));
        Ok(())
    }
}

/// Create a temporary config file with `content`.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).expect("Failed to write config");
    (dir, path)
}

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}
