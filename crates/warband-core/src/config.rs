//! Engine configuration: `warband-config.yaml` parsed into typed sections.
//!
//! Every key is optional. Missing sections and fields fall back to the
//! defaults below, and a few infrastructure settings can be overridden from
//! the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use warband_battle::BattleConfig;

/// Why a configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The content is not valid YAML for [`SimulationConfig`].
    #[error("invalid config YAML: {source}")]
    Yaml {
        /// Parser error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `warband-config.yaml`. Every field has a
/// default, so an empty file yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (seed, timing).
    #[serde(default)]
    pub world: WorldConfig,

    /// Combat tunables.
    #[serde(default)]
    pub battle: BattleConfig,

    /// Store connection settings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Run-loop boundaries.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,
}

impl SimulationConfig {
    /// Read and parse `path`.
    ///
    /// Environment overrides, applied after parsing:
    /// - `DRAGONFLY_URL` overrides `infrastructure.dragonfly_url`
    /// - `WARBAND_SEED_FILE` overrides `infrastructure.seed_file`
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] for an unreadable file, [`ConfigError::Yaml`] for
    /// bad content.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a YAML document. An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Yaml`] for bad content.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document parses as unit, not as an empty mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed; each battle's RNG derives from it, the tick and the
    /// battle id.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Which world store the engine runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared `Dragonfly` instance.
    #[default]
    Dragonfly,
    /// In-process tree, loaded from the seed file (or empty).
    Memory,
}

/// Infrastructure configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Store backend.
    #[serde(default)]
    pub store: StoreBackend,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Key prefix for every document the engine reads and writes.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// JSON world file. The memory store starts from it; with `Dragonfly`
    /// it is imported over the stored world before the first tick.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Memory store only: write the final world back to the seed file.
    #[serde(default)]
    pub write_back: bool,
}

impl InfrastructureConfig {
    /// Override infrastructure settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("WARBAND_SEED_FILE") {
            self.seed_file = (!val.is_empty()).then(|| PathBuf::from(val));
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            dragonfly_url: default_dragonfly_url(),
            namespace: default_namespace(),
            seed_file: None,
            write_back: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Run-loop boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Number of the first tick the engine runs.
    #[serde(default = "default_start_tick")]
    pub start_tick: u64,

    /// Maximum number of ticks before the engine stops (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            start_tick: default_start_tick(),
            max_ticks: 0,
        }
    }
}

// --- Defaults ---

fn default_world_name() -> String {
    "Warband".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    10_000
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_namespace() -> String {
    "warband".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_start_tick() -> u64 {
    1
}
