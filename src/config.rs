//! Configuration Module
//!
//! Handles loading and managing scanner configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

// == Bounds ==
/// Allowed range for the region worker pool
pub const MAX_WORKERS_RANGE: (usize, usize) = (1, 20);
/// Allowed range for the per-region service worker pool
pub const SERVICE_WORKERS_RANGE: (usize, usize) = (1, 10);

/// Scanner configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of regions scanned concurrently
    pub max_workers: usize,
    /// Number of services scanned concurrently within one region
    pub service_workers: usize,
    /// Time-to-live applied to every cache entry
    pub cache_ttl: Duration,
    /// Directory used by the file cache backend
    pub cache_dir: PathBuf,
    /// Whether scans read and populate the cache
    pub use_cache: bool,
    /// Upper bound on a single blocking scanner call
    pub unit_timeout: Duration,
    /// Capacity of the in-memory cache backend
    pub max_cache_entries: usize,
    /// Interval between expired-entry reaper runs
    pub reap_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CLOUDSCAN_MAX_WORKERS` - Region workers (default: 8, clamped to 1-20)
    /// - `CLOUDSCAN_SERVICE_WORKERS` - Service workers per region (default: 4, clamped to 1-10)
    /// - `CLOUDSCAN_CACHE_TTL` - Cache TTL in seconds (default: 600)
    /// - `CLOUDSCAN_CACHE_DIR` - File cache directory (default: `<tmp>/cloudscan_cache`)
    /// - `CLOUDSCAN_USE_CACHE` - `true`/`false` (default: true)
    /// - `CLOUDSCAN_UNIT_TIMEOUT` - Per-call timeout in seconds (default: 60)
    /// - `CLOUDSCAN_MAX_CACHE_ENTRIES` - In-memory cache capacity (default: 1000)
    /// - `CLOUDSCAN_REAP_INTERVAL` - Reaper interval in seconds (default: 60)
    pub fn from_env() -> Self {
        match Self::load(false) {
            Ok(config) => config,
            // Lenient loading never reports an error
            Err(_) => Self::default(),
        }
    }

    /// Like [`from_env`](Self::from_env), but rejects unparseable values.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::load(true)
    }

    fn load(strict: bool) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |secs: u64| Duration::from_secs(secs);
        Ok(Self {
            max_workers: env_parse("CLOUDSCAN_MAX_WORKERS", strict)?
                .unwrap_or(defaults.max_workers),
            service_workers: env_parse("CLOUDSCAN_SERVICE_WORKERS", strict)?
                .unwrap_or(defaults.service_workers),
            cache_ttl: env_parse("CLOUDSCAN_CACHE_TTL", strict)?
                .map(secs)
                .unwrap_or(defaults.cache_ttl),
            cache_dir: env::var("CLOUDSCAN_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            use_cache: env_parse("CLOUDSCAN_USE_CACHE", strict)?.unwrap_or(defaults.use_cache),
            unit_timeout: env_parse("CLOUDSCAN_UNIT_TIMEOUT", strict)?
                .map(secs)
                .unwrap_or(defaults.unit_timeout),
            max_cache_entries: env_parse("CLOUDSCAN_MAX_CACHE_ENTRIES", strict)?
                .unwrap_or(defaults.max_cache_entries),
            reap_interval: env_parse("CLOUDSCAN_REAP_INTERVAL", strict)?
                .map(secs)
                .unwrap_or(defaults.reap_interval),
        }
        .validated())
    }

    /// Returns a copy with worker counts clamped into their allowed ranges.
    pub fn validated(mut self) -> Self {
        self.max_workers = clamp_workers(self.max_workers, MAX_WORKERS_RANGE);
        self.service_workers = clamp_workers(self.service_workers, SERVICE_WORKERS_RANGE);
        self.max_cache_entries = self.max_cache_entries.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 8,
            service_workers: 4,
            cache_ttl: Duration::from_secs(600),
            cache_dir: env::temp_dir().join("cloudscan_cache"),
            use_cache: true,
            unit_timeout: Duration::from_secs(60),
            max_cache_entries: 1000,
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Clamps a worker count into `[min, max]`.
pub fn clamp_workers(value: usize, (min, max): (usize, usize)) -> usize {
    value.clamp(min, max)
}

/// Reads and parses `name`. Unset is `None`; an unparseable value is an
/// error when `strict`, otherwise it is logged and treated as unset.
fn env_parse<T: FromStr>(name: &str, strict: bool) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) if strict => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        Err(_) => {
            warn!(name, value = %raw, "Ignoring unparseable configuration value");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.service_workers, 4);
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert!(config.use_cache);
        assert_eq!(config.unit_timeout, Duration::from_secs(60));
        assert!(config.cache_dir.ends_with("cloudscan_cache"));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CLOUDSCAN_MAX_WORKERS",
            "CLOUDSCAN_SERVICE_WORKERS",
            "CLOUDSCAN_CACHE_TTL",
            "CLOUDSCAN_CACHE_DIR",
            "CLOUDSCAN_USE_CACHE",
            "CLOUDSCAN_UNIT_TIMEOUT",
            "CLOUDSCAN_MAX_CACHE_ENTRIES",
            "CLOUDSCAN_REAP_INTERVAL",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config, Config::default());

        // Kept in this test: env vars are process-wide
        env::set_var("CLOUDSCAN_REAP_INTERVAL", "soon");
        assert_eq!(Config::from_env(), Config::default());
        assert_eq!(
            Config::try_from_env(),
            Err(ConfigError::Invalid {
                name: "CLOUDSCAN_REAP_INTERVAL".to_string(),
                value: "soon".to_string(),
            })
        );
        env::remove_var("CLOUDSCAN_REAP_INTERVAL");
    }

    #[test]
    fn test_validated_clamps_workers() {
        let config = Config {
            max_workers: 50,
            service_workers: 0,
            ..Config::default()
        }
        .validated();
        assert_eq!(config.max_workers, 20);
        assert_eq!(config.service_workers, 1);
    }

    #[test]
    fn test_clamp_workers_in_range() {
        assert_eq!(clamp_workers(5, MAX_WORKERS_RANGE), 5);
        assert_eq!(clamp_workers(0, MAX_WORKERS_RANGE), 1);
        assert_eq!(clamp_workers(11, SERVICE_WORKERS_RANGE), 10);
    }
}
