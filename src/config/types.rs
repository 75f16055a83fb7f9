use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub hooks: HookConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Navigation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Location `back()` falls back to when history is too shallow.
    #[serde(default = "default_root")]
    pub root: String,
    /// Reserved location for unmatched navigations.
    #[serde(default = "default_not_found_path")]
    pub not_found_path: String,
    /// Reserved location for hard navigation faults.
    #[serde(default = "default_error_path")]
    pub error_path: String,
    /// Upper bound on guard redirects chained from one navigation.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

/// Hook bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Priority used by `HookBus::on` when none is given (lower runs first).
    #[serde(default = "default_priority")]
    pub default_priority: i32,
}

/// How the reconciler pairs old and new children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildDiff {
    /// Match children by index. Reordered lists are rebuilt.
    #[default]
    Positional,
    /// Match keyed children by key and move host nodes instead of rebuilding.
    Keyed,
}

/// Reconciler settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub child_diff: ChildDiff,
}

/// Logging settings consumed by `logging::init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Include timestamps in log lines.
    #[serde(default)]
    pub timestamps: bool,
    /// Emit one JSON object per line instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_root() -> String {
    "/".to_string()
}

fn default_not_found_path() -> String {
    "/404".to_string()
}

fn default_error_path() -> String {
    "/500".to_string()
}

fn default_max_redirects() -> u32 {
    8
}

fn default_priority() -> i32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            not_found_path: default_not_found_path(),
            error_path: default_error_path(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            default_priority: default_priority(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: false,
            json: false,
        }
    }
}
