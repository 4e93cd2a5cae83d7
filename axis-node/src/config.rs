//! Load daemon config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration. File: $AXIS_CONFIG, ~/.config/axis/config.toml or /etc/axis/config.toml.
/// Env overrides: AXIS_BIND, AXIS_PEERS (comma separated).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Local endpoint descriptor to bind (default "127.0.0.1:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Peers to connect to at startup.
    #[serde(default)]
    pub peers: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            peers: Vec::new(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("AXIS_BIND") {
        if !s.trim().is_empty() {
            c.bind = s.trim().to_string();
        }
    }
    if let Some(s) = var("AXIS_PEERS") {
        c.peers = split_list(&s);
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Explicit config file, checked before the search path.
const CONFIG_ENV: &str = "AXIS_CONFIG";
/// Per-user config, relative to `$HOME`.
const USER_CONFIG: &str = ".config/axis/config.toml";
const SYSTEM_CONFIG: &str = "/etc/axis/config.toml";

fn config_paths() -> impl Iterator<Item = PathBuf> {
    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let user = std::env::var_os("HOME").map(|home| Path::new(&home).join(USER_CONFIG));
    explicit
        .into_iter()
        .chain(user)
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG)))
}

fn load_file() -> Option<Config> {
    load_first(config_paths())
}

/// The first existing file wins, even when it is invalid.
fn load_first(paths: impl IntoIterator<Item = PathBuf>) -> Option<Config> {
    let path = paths.into_iter().find(|p| p.exists())?;
    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| tracing::warn!(path = %path.display(), "cannot read config: {e}"))
        .ok()?;
    toml::from_str(&parsed)
        .map_err(|e| tracing::warn!(path = %path.display(), "ignoring invalid config: {e}"))
        .ok()
}
