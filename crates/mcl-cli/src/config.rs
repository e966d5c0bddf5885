//! Node configuration – reads/writes `~/.mcl/config.toml`.
//!
//! ```toml
//! [frames]
//! map = "map"
//! odom = "odom"
//! base_link = "base_link"
//! laser = "laser"
//!
//! [filter]
//! particle_count = 300
//! sample_factor = 0.25
//!
//! [runtime]
//! broadcast_hz = 5.0
//! transform_timeout_ms = 1000
//!
//! [map]
//! path = "maps/office.txt"
//! resolution = 0.05
//! origin = [0.0, 0.0]
//!
//! [laser_mount]
//! x = 0.2
//! y = 0.0
//! heading = 0.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mcl_filter::{FilterParams, Frames};
use mcl_runtime::NodeConfig;
use mcl_types::Pose2D;
use serde::{Deserialize, Serialize};

fn default_broadcast_hz() -> f64 {
    5.0
}
fn default_transform_timeout_ms() -> u64 {
    1000
}
fn default_resolution() -> f64 {
    0.05
}

/// Rates and timeouts of the running node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_broadcast_hz")]
    pub broadcast_hz: f64,
    #[serde(default = "default_transform_timeout_ms")]
    pub transform_timeout_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            broadcast_hz: default_broadcast_hz(),
            transform_timeout_ms: default_transform_timeout_ms(),
        }
    }
}

/// Where the ASCII occupancy map lives and how it sits in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Metres per cell.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// World coordinates of the lower-left corner.
    #[serde(default)]
    pub origin: [f64; 2],
}

impl Default for MapSection {
    fn default() -> Self {
        Self {
            path: None,
            resolution: default_resolution(),
            origin: [0.0, 0.0],
        }
    }
}

/// Persisted node configuration stored in `~/.mcl/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub frames: Frames,
    #[serde(default)]
    pub filter: FilterParams,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub map: MapSection,
    /// Laser pose in the base frame.
    #[serde(default)]
    pub laser_mount: Pose2D,
}

impl Config {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            frames: self.frames.clone(),
            broadcast_hz: self.runtime.broadcast_hz,
            transform_timeout: Duration::from_millis(self.runtime.transform_timeout_ms),
        }
    }
}

/// Return the path to `~/.mcl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mcl").join("config.toml")
}

/// Load the effective configuration: the file at `path` (or the default
/// location) when present, defaults otherwise, then `MCL_*` overrides.
pub fn load_effective(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `MCL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MCL_PARTICLES` | `filter.particle_count` |
/// | `MCL_SEED` | `filter.seed` |
/// | `MCL_MAP` | `map.path` |
/// | `MCL_BROADCAST_HZ` | `runtime.broadcast_hz` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MCL_PARTICLES")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.filter.particle_count = n;
    }
    if let Ok(v) = std::env::var("MCL_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.filter.seed = Some(seed);
    }
    if let Ok(v) = std::env::var("MCL_MAP")
        && !v.is_empty()
    {
        cfg.map.path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("MCL_BROADCAST_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.runtime.broadcast_hz = hz;
    }
}

/// Render `cfg` as TOML.
pub fn to_toml(cfg: &Config) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))
}

/// Write `cfg` to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = to_toml(cfg)?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
