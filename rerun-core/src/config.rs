//! Runtime configuration.
//!
//! Durations are written as seconds in JSON:
//!
//! ```json
//! { "default_data_ttl": 3600, "session_idle_timeout": 1800.5 }
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Default guard against scripts that request a rerun on every run.
pub const DEFAULT_MAX_RERUNS_PER_EVENT: usize = 100;

/// Default period of the idle-session reaper.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration shared by an [`App`](crate::app::App) and everything it owns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Ttl for data caches created without an explicit one.
    /// `None` means entries never expire.
    #[serde(deserialize_with = "opt_secs")]
    pub default_data_ttl: Option<Duration>,

    /// Default bound on the number of entries per data cache.
    pub data_cache_max_entries: Option<usize>,

    /// How many consecutive reruns a single event may cause.
    pub max_reruns_per_event: usize,

    /// Sessions untouched for longer than this are expired.
    #[serde(deserialize_with = "opt_secs")]
    pub session_idle_timeout: Option<Duration>,

    /// Period of the background reaper.
    #[serde(deserialize_with = "nonzero_secs")]
    pub cleanup_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_data_ttl: None,
            data_cache_max_entries: None,
            max_reruns_per_event: DEFAULT_MAX_RERUNS_PER_EVENT,
            session_idle_timeout: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Set the ttl used by data caches that do not specify one.
    pub fn with_default_data_ttl(mut self, ttl: Duration) -> Self {
        self.default_data_ttl = Some(ttl);
        self
    }

    /// Bound every data cache to `max` entries unless it specifies its own bound.
    pub fn with_data_cache_max_entries(mut self, max: usize) -> Self {
        self.data_cache_max_entries = Some(max);
        self
    }

    /// Set the rerun loop guard.
    pub fn with_max_reruns_per_event(mut self, max: usize) -> Self {
        self.max_reruns_per_event = max;
        self
    }

    /// Expire sessions idle for longer than `timeout`.
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = Some(timeout);
        self
    }

    /// Set the reaper period. A zero period makes the reaper fall back to
    /// [`DEFAULT_CLEANUP_INTERVAL`].
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

fn nonzero_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    let duration = Duration::try_from_secs_f64(raw).map_err(serde::de::Error::custom)?;
    if duration.is_zero() {
        return Err(serde::de::Error::custom("period must be greater than zero"));
    }
    Ok(duration)
}

fn opt_secs<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        Some(raw) => Duration::try_from_secs_f64(raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
