use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{error, info};

/// Default location of the navigation config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Static navigation configuration, loaded once when a world session starts.
///
/// These values shape the search results (diagonal rule, heuristic weight), so
/// they must not change while a session is running: two sessions replaying the
/// same edits with the same config produce the same routes.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    /// Number of search worker threads. `0` runs searches inline during `pump`.
    pub worker_count: usize,
    /// Allow 8-connected movement. When false the graph is 4-connected.
    pub diagonal_movement: bool,
    /// Heuristic weight for weighted A*. `1.0` gives optimal routes.
    pub heuristic_weight: f32,
    /// Node expansion budget per search. Exceeding it fails the search with `NoPath`.
    pub max_search_nodes: usize,
    /// Collapse collinear waypoints and shortcut along clear lines of sight.
    pub smoothing: bool,
    /// Searches slower than this are logged with `warn!`.
    pub slow_search_warn_ms: u64,
    /// Warn when more than this many requests are queued or running.
    pub high_pending_warn: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            diagonal_movement: true,
            heuristic_weight: 1.0,
            max_search_nodes: 250_000,
            smoothing: true,
            slow_search_warn_ms: 50,
            high_pending_warn: 256,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(ron::error::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ron::error::SpannedError> for ConfigError {
    fn from(e: ron::error::SpannedError) -> Self {
        Self::Parse(e)
    }
}

impl NavConfig {
    /// Parse a config from RON text. Missing fields take their default values.
    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str::<NavConfig>(contents)?)
    }

    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    /// Load the config, falling back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(config) => {
                info!("Loaded nav config from {}", path.display());
                config
            }
            Err(e) => {
                error!("{} ({})", e, path.display());
                error!("Using default NavConfig");
                Self::default()
            }
        }
    }
}
