use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Settings for the shared cache.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// How long an entry stays visible after it was last written.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// How often a background task purges expired entries.
    ///
    /// Expired entries are never returned regardless of this setting; the
    /// sweep only reclaims their memory. `None` disables the task.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    /// Upper bound on the number of entries. Unbounded when unset.
    pub max_capacity: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: Some(Duration::from_secs(10 * 60)),
            max_capacity: None,
        }
    }
}

/// Settings for the per-request batch windows.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// How long a batch collects keys after the first one arrives.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Dispatch a batch early once it holds this many distinct keys.
    pub max_keys: Option<NonZeroUsize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(16),
            max_keys: None,
        }
    }
}

/// Settings for the simulated upstream source.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Latency added once per upstream call.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdatesConfig {
    /// Time between two symbol updates on a subscription.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub upstream: UpstreamConfig,
    pub updates: UpdatesConfig,
}

impl Config {
    /// Parse a YAML document. Missing fields keep their defaults.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read and parse a YAML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }
}
