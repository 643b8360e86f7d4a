use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the cache.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Fine-tuning of a [`LazyCache`](crate::caching::LazyCache).
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct LazyCacheConfig {
    /// How long a (re)populated entry is considered fresh.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Sizing hint for the underlying mapping.
    pub initial_capacity: usize,

    /// Maximum number of concurrently running background refreshes.
    ///
    /// Leaving this unset does not limit background refreshes at all.
    pub max_lazy_refreshes: Option<isize>,
}

impl Default for LazyCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            initial_capacity: 0,
            max_lazy_refreshes: None,
        }
    }
}

/// How a [`MissGuard`](crate::caching::MissGuard) keeps track of suppressed keys.
#[derive(Debug, Clone, Copy, Default, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SuppressionStrategy {
    /// One exact suppression record per key.
    ///
    /// Memory grows with the number of distinct keys that came back empty within one window.
    /// Expired records are dropped whenever the table has doubled in size.
    #[default]
    Unbounded,
    /// A fixed table of `size` suppression slots.
    ///
    /// Each newly suppressed key is assigned a random slot, taking it over from the key that
    /// owned it before. At most `size` keys are tracked at any time, but a key may lose its
    /// suppression early when another key lands in the same slot.
    Slots {
        /// The number of slots, at least `1`.
        size: usize,
    },
}

/// Fine-tuning of a [`MissGuard`](crate::caching::MissGuard).
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct MissGuardConfig {
    /// How long a key that came back empty is suppressed.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// How suppression records are stored.
    pub strategy: SuppressionStrategy,
}

impl Default for MissGuardConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            strategy: SuppressionStrategy::Unbounded,
        }
    }
}

/// Periodic bulk reloads of a [`LazyCache`](crate::caching::LazyCache).
#[derive(Debug, Clone, Copy, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Time between two bulk reloads.
    ///
    /// Bulk reloading is disabled when this is unset.
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// The lazy cache.
    pub cache: LazyCacheConfig,

    /// Negative caching in front of the cache's provider.
    pub miss_guard: MissGuardConfig,

    /// Optional bulk reloading of the cache.
    pub reload: ReloadConfig,
}

impl Config {
    /// Loads the configuration from the given YAML file, or the defaults if no path is given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
