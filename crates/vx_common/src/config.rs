//! Game configuration handling

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::prelude::*;

/// The server-specific configuration.
#[derive(Clone, PartialEq, Debug, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Streamer load range around each observer, in chunks (chebyshev radius).
    #[default = 4]
    pub load_distance: i32,
    /// The port the RPC endpoint listens on.
    #[default = 28032]
    pub port: u16,
    /// Number of worker threads serving RPC requests.
    #[default = 2]
    pub rpc_thread_number: usize,
}

/// Client-side presentation and input configuration.
#[derive(Clone, PartialEq, Debug, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    /// Whether look rotation keeps decaying momentum after input stops.
    /// The key keeps its historical spelling, saved configs depend on it.
    #[serde(rename = "rotation_interia")]
    #[default = false]
    pub rotation_inertia: bool,
    /// Look sensitivity multiplier applied to raw mouse deltas.
    #[default = 1.0]
    pub mouse_sensitivity: f64,
    /// Render range in chunks, consumed by the renderer.
    #[default = 8]
    pub render_distance: i32,
}

/// All game configuration saved into the config file.
#[derive(Clone, PartialEq, Debug, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// GUI configuration.
    pub gui: GuiConfig,
    /// Scheduler read-phase worker pool size.
    #[default(default_update_threads())]
    pub update_thread_number: usize,
}

fn default_update_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl GameConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Parsing game configuration")
    }

    /// Loads the configuration from a TOML file; a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Reading game configuration from {}", path.display())),
        }
    }

    /// Wraps the configuration into a shared live handle.
    pub fn new_handle(self) -> GameConfigHandle {
        GameConfigHandle::new(self)
    }
}

/// A cloneable handle to the live game configuration.
///
/// Regular tasks call [`Self::peek`] every tick, so reads are a single atomic load of
/// the current snapshot; updates replace the snapshot wholesale and reach every clone
/// of the handle.
#[derive(Clone)]
pub struct GameConfigHandle {
    shared: Arc<ArcSwap<GameConfig>>,
}

impl GameConfigHandle {
    /// Wraps an initial configuration.
    pub fn new(config: GameConfig) -> Self {
        Self {
            shared: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// The current configuration snapshot. Values read from it stay coherent with each
    /// other even if an update lands meanwhile.
    pub fn peek(&self) -> Arc<GameConfig> {
        self.shared.load_full()
    }

    /// Publishes a modified configuration to all handles. Concurrent updates are
    /// retried until they apply cleanly, so none is dropped.
    pub fn update(&self, mutate: impl Fn(&mut GameConfig)) {
        self.shared.rcu(|current| {
            let mut next = GameConfig::clone(current);
            mutate(&mut next);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GameConfig::default();
        assert_eq!(config.server.load_distance, 4);
        assert_eq!(config.server.port, 28032);
        assert!(config.update_thread_number >= 1);
        assert!(!config.gui.rotation_inertia);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = GameConfig::from_toml(
            r#"
            update_thread_number = 3

            [server]
            load_distance = 6

            [gui]
            rotation_interia = true
            mouse_sensitivity = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.load_distance, 6);
        assert_eq!(config.server.port, 28032);
        assert_eq!(config.update_thread_number, 3);
        assert!(config.gui.rotation_inertia);
        assert_eq!(config.gui.mouse_sensitivity, 0.5);
        assert_eq!(config.gui.render_distance, 8);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(GameConfig::from_toml("server = 3").is_err());
    }

    #[test]
    fn handle_updates_reach_every_clone() {
        let handle = GameConfig::default().new_handle();
        let other = handle.clone();
        handle.update(|c| c.server.load_distance = 9);
        assert_eq!(other.peek().server.load_distance, 9);
        // Untouched fields survive the update.
        assert_eq!(other.peek().server.port, 28032);
    }
}
