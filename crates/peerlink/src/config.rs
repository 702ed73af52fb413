//! Runtime configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;

use fileserver::{DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL};

/// Error raised when an environment variable holds an unusable value
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_concurrent_requests: usize,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upload_dir: std::env::temp_dir().join("peerlink-uploads"),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("PEERLINK_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(dir) = lookup("PEERLINK_UPLOAD_DIR").filter(|d| !d.trim().is_empty()) {
            config.upload_dir = PathBuf::from(dir.trim());
        }
        if let Some(max) = parse::<usize, _>(&lookup, "PEERLINK_MAX_CONCURRENT_REQUESTS")? {
            if max == 0 {
                return Err(ConfigError {
                    key: "PEERLINK_MAX_CONCURRENT_REQUESTS",
                    value: max.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_concurrent_requests = max;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PEERLINK_SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PEERLINK_REAPER_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ConfigError {
                    key: "PEERLINK_REAPER_INTERVAL_SECS",
                    value: secs.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
