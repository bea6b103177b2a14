//! Configuration loading and typed config structures for the Daphnia server.
//!
//! The canonical configuration lives in `daphnia-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, and
//! provides a loader that reads and validates the file. Every field has a
//! default, so an empty document (or no file at all) yields a runnable
//! configuration.

use std::path::{Path, PathBuf};

use daphnia_ether::DEFAULT_WEAKENING;
use daphnia_observer::MAX_EYE_SIZE;
use daphnia_types::Vec3;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DaphniaConfig {
    /// Universe extents, scale, and persistence.
    #[serde(default)]
    pub universe: UniverseConfig,

    /// Worker threads and propagation parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Client and admin endpoints.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Observer parameters.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaphniaConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override deployment-facing values:
    /// - `DAPHNIA_UNIVERSE_FILE` overrides `universe.file`
    /// - `DAPHNIA_THREADS` overrides `simulation.threads`
    /// - `DAPHNIA_CLIENT_PORT` overrides `network.client_port`
    /// - `DAPHNIA_ADMIN_PORT` overrides `network.admin_port`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override values with environment variables when set and parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DAPHNIA_UNIVERSE_FILE") {
            self.universe.file = Some(PathBuf::from(val));
        }
        if let Some(val) = env_parse("DAPHNIA_THREADS") {
            self.simulation.threads = val;
        }
        if let Some(val) = env_parse("DAPHNIA_CLIENT_PORT") {
            self.network.client_port = val;
        }
        if let Some(val) = env_parse("DAPHNIA_ADMIN_PORT") {
            self.network.admin_port = val;
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = &self.universe;
        if u.size_x <= 0 || u.size_y <= 0 || u.size_z <= 0 {
            return Err(invalid(format!(
                "universe size must be positive, got {}x{}x{}",
                u.size_x, u.size_y, u.size_z
            )));
        }
        if u.scale <= 0 {
            return Err(invalid(format!("universe scale must be positive, got {}", u.scale)));
        }
        if self.physical_size().is_none() {
            return Err(invalid("universe size times scale overflows".to_owned()));
        }
        if self.observer.eye_size == 0 || self.observer.eye_size > MAX_EYE_SIZE {
            return Err(invalid(format!(
                "observer.eye_size must be within 1..={MAX_EYE_SIZE}, got {}",
                self.observer.eye_size
            )));
        }
        if self.network.max_observers == 0 {
            return Err(invalid("network.max_observers must be at least 1".to_owned()));
        }
        if self.simulation.worker_count() == 0 {
            return Err(invalid(
                "simulation.near_observer_threads must be at least 1 when threads is 0".to_owned(),
            ));
        }
        if self.simulation.simulation_size <= 0 {
            return Err(invalid("simulation.simulation_size must be positive".to_owned()));
        }
        Ok(())
    }

    /// Logical universe extents (before scaling).
    pub const fn logical_size(&self) -> Vec3 {
        Vec3::new(self.universe.size_x, self.universe.size_y, self.universe.size_z)
    }

    /// Physical grid extents: logical size times scale.
    pub const fn physical_size(&self) -> Option<Vec3> {
        self.logical_size().checked_scale(self.universe.scale)
    }

    /// Weakening per step in the physical grid.
    ///
    /// A scaled universe has `scale` cells per logical voxel, so photons
    /// lose proportionally less per step to keep the same reach.
    pub fn effective_weakening(&self) -> u8 {
        let scale = u8::try_from(self.universe.scale).unwrap_or(u8::MAX);
        self.simulation.weakening.checked_div(scale).unwrap_or(0).max(1)
    }
}

/// Universe extents, scale, and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UniverseConfig {
    /// Logical extent along X.
    #[serde(default = "default_universe_extent")]
    pub size_x: i32,

    /// Logical extent along Y.
    #[serde(default = "default_universe_extent")]
    pub size_y: i32,

    /// Logical extent along Z.
    #[serde(default = "default_universe_extent")]
    pub size_z: i32,

    /// Physical cells per logical voxel along each axis.
    #[serde(default = "default_scale")]
    pub scale: i32,

    /// Universe file to load at startup.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Where to save the universe on shutdown.
    #[serde(default)]
    pub save_on_exit: Option<PathBuf>,

    /// Seed for propagation streams, crumb colors, and spawn positions.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            size_x: default_universe_extent(),
            size_y: default_universe_extent(),
            size_z: default_universe_extent(),
            scale: default_scale(),
            file: None,
            save_on_exit: None,
            seed: default_seed(),
        }
    }
}

/// Worker threads and propagation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Worker threads over the whole universe (0 = simulate near observers).
    #[serde(default)]
    pub threads: usize,

    /// Worker threads used when `threads` is 0.
    #[serde(default = "default_near_observer_threads")]
    pub near_observer_threads: usize,

    /// Reach of the simulated region around an observer, in cells.
    #[serde(default = "default_simulation_size")]
    pub simulation_size: i32,

    /// Alpha lost per propagation step (before scale adjustment).
    #[serde(default = "default_weakening")]
    pub weakening: u8,

    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Statistics window in milliseconds.
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl SimulationConfig {
    /// Whether only the region near observers is simulated.
    pub const fn simulate_near_observers(&self) -> bool {
        self.threads == 0
    }

    /// Number of worker threads to spawn.
    pub const fn worker_count(&self) -> usize {
        if self.simulate_near_observers() {
            self.near_observer_threads
        } else {
            self.threads
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            near_observer_threads: default_near_observer_threads(),
            simulation_size: default_simulation_size(),
            weakening: default_weakening(),
            max_ticks: 0,
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

/// Client and admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Handshake port; observer endpoints use ephemeral ports.
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// Largest number of concurrently attached observers.
    #[serde(default = "default_max_observers")]
    pub max_observers: usize,

    /// Admin HTTP API port.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            client_port: default_client_port(),
            max_observers: default_max_observers(),
            admin_port: default_admin_port(),
        }
    }
}

/// Observer parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Eye resolution in pixels per side.
    #[serde(default = "default_eye_size")]
    pub eye_size: u8,

    /// Random positions tried before a spawn gives up.
    #[serde(default = "default_spawn_attempts")]
    pub spawn_attempts: u32,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            eye_size: default_eye_size(),
            spawn_attempts: default_spawn_attempts(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
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

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

const fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_universe_extent() -> i32 {
    32
}

const fn default_scale() -> i32 {
    1
}

const fn default_seed() -> u64 {
    42
}

const fn default_near_observer_threads() -> usize {
    4
}

const fn default_simulation_size() -> i32 {
    8
}

const fn default_weakening() -> u8 {
    DEFAULT_WEAKENING
}

const fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_client_port() -> u16 {
    50_000
}

const fn default_max_observers() -> usize {
    16
}

const fn default_admin_port() -> u16 {
    8080
}

const fn default_eye_size() -> u8 {
    MAX_EYE_SIZE
}

const fn default_spawn_attempts() -> u32 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}
