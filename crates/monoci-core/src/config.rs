//! Build run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CiError, Result};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default wall-clock budget for a build run (15 min + 500 ms).
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(15 * 60 * 1000 + 500);

pub const POLL_INTERVAL_ENV: &str = "MONOCI_POLL_INTERVAL_SECS";
pub const TIMEOUT_ENV: &str = "MONOCI_TIMEOUT_SECS";

/// Timing parameters for one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,

    /// Deadline after which unfinished builds are cancelled.
    pub max_duration: Duration,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

impl BuildConfig {
    pub fn new(poll_interval: Duration, max_duration: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(CiError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(Self {
            poll_interval,
            max_duration,
        })
    }

    /// Defaults overridden by `MONOCI_POLL_INTERVAL_SECS` / `MONOCI_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let poll_interval = match lookup(POLL_INTERVAL_ENV) {
            Some(raw) => parse_secs(POLL_INTERVAL_ENV, &raw)?,
            None => defaults.poll_interval,
        };
        let max_duration = match lookup(TIMEOUT_ENV) {
            Some(raw) => parse_secs(TIMEOUT_ENV, &raw)?,
            None => defaults.max_duration,
        };
        Self::new(poll_interval, max_duration)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| CiError::Config(format!("{key}={raw:?} is not a number of seconds: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.max_duration, Duration::from_millis(900_500));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = BuildConfig::from_lookup(|key| match key {
            POLL_INTERVAL_ENV => Some("2".to_string()),
            TIMEOUT_ENV => Some("60".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = BuildConfig::from_lookup(|key| {
            (key == TIMEOUT_ENV).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(TIMEOUT_ENV));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(BuildConfig::new(Duration::ZERO, DEFAULT_MAX_DURATION).is_err());
    }
}
