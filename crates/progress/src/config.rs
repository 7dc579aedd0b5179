use std::path::PathBuf;
use std::time::Duration;

use crate::poller::PollerConfig;
use crate::retry::DEFAULT_MAX_NOT_FOUND;

/// Default directory of the persistent progress cache.
pub const DEFAULT_CACHE_DIR: &str = ".schedgen-cache";

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Tracker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Base URL of the generation API, without a trailing slash.
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Consecutive not-found responses tolerated after submission.
    pub race_retry_max: u32,
    pub cache_dir: PathBuf,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default            |
    /// |------------------------|--------------------|
    /// | `PROGRESS_API_URL`     | required           |
    /// | `POLL_INTERVAL_MS`     | `2000`             |
    /// | `REQUEST_TIMEOUT_SECS` | `10`               |
    /// | `RACE_RETRY_MAX`       | `5`                |
    /// | `PROGRESS_CACHE_DIR`   | `.schedgen-cache`  |
    /// | `ACCESS_TOKEN`         | unset              |
    /// | `REFRESH_TOKEN`        | unset              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = var("PROGRESS_API_URL")
            .ok_or(ConfigError::Missing("PROGRESS_API_URL"))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let poll_interval_ms = parse_or(
            var("POLL_INTERVAL_MS"),
            "POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_MS",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let request_timeout_secs = parse_or(
            var("REQUEST_TIMEOUT_SECS"),
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "REQUEST_TIMEOUT_SECS",
                expected: "a positive integer",
                value: "0".into(),
            });
        }
        let race_retry_max = parse_or(var("RACE_RETRY_MAX"), "RACE_RETRY_MAX", DEFAULT_MAX_NOT_FOUND)?;

        let cache_dir = var("PROGRESS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        Ok(Self {
            api_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            race_retry_max,
            cache_dir,
            access_token: var("ACCESS_TOKEN"),
            refresh_token: var("REFRESH_TOKEN"),
        })
    }

    /// Poller parameters derived from this configuration.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            request_timeout: self.request_timeout,
            max_not_found: self.race_retry_max,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a non-negative integer",
            value,
        }),
    }
}
