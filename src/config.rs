use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Sample intervals below this make the profiler itself show up in the data.
pub const RECOMMENDED_MIN_INTERVAL: Duration = Duration::from_millis(20);

/// Top-level configuration for the flameprof service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// HTTP API server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Sampling profiler configuration.
    #[serde(default)]
    pub profiler: ProfilerConfig,
}

/// HTTP API server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Listen address. Default: "0.0.0.0:8080".
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

/// Sampling profiler configuration. Immutable after initialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// Whether the sampler cadence is started at all. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between sampling ticks. Default: 50ms, recommended >= 20ms.
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub sample_interval: Duration,

    /// Delay before the first sampling tick. Default: 1s.
    #[serde(default = "default_startup_delay", with = "humantime_serde")]
    pub startup_delay: Duration,

    /// Maximum number of frames kept per collapsed stack. Default: 100.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of distinct signatures retained. Default: 10000.
    #[serde(default = "default_max_stored_stacks")]
    pub max_stored_stacks: usize,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sample_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_startup_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_depth() -> usize {
    100
}

fn default_max_stored_stacks() -> usize {
    10_000
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            profiler: ProfilerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval: default_sample_interval(),
            startup_delay: default_startup_delay(),
            max_depth: default_max_depth(),
            max_stored_stacks: default_max_stored_stacks(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.server.addr.is_empty() {
            bail!("server.addr is required");
        }

        if self.profiler.sample_interval.is_zero() {
            bail!("profiler.sample_interval must be positive");
        }

        if self.profiler.max_depth == 0 {
            bail!("profiler.max_depth must be positive");
        }

        if self.profiler.max_stored_stacks == 0 {
            bail!("profiler.max_stored_stacks must be positive");
        }

        Ok(())
    }
}
