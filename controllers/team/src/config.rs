//! Controller configuration
//!
//! All settings come from environment variables and are validated once at
//! startup; an invalid value stops the controller before it touches the
//! cluster.

use crate::error::ControllerError;
use std::time::Duration;

pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
pub const CONCURRENCY_ENV: &str = "TEAM_CONTROLLER_CONCURRENCY";
pub const BACKOFF_MIN_ENV: &str = "TEAM_CONTROLLER_BACKOFF_MIN_SECONDS";
pub const BACKOFF_MAX_ENV: &str = "TEAM_CONTROLLER_BACKOFF_MAX_SECONDS";
pub const RESYNC_ENV: &str = "TEAM_CONTROLLER_RESYNC_SECONDS";

const DEFAULT_CONCURRENCY: u16 = 3;
const DEFAULT_BACKOFF_MIN_SECONDS: u64 = 5;
const DEFAULT_BACKOFF_MAX_SECONDS: u64 = 300;

/// Runtime settings of the Team controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch Teams in; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Maximum number of reconcile passes in flight
    pub concurrency: u16,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Re-reconcile converged Teams this often, if set
    pub resync_interval: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            concurrency: DEFAULT_CONCURRENCY,
            backoff_min: Duration::from_secs(DEFAULT_BACKOFF_MIN_SECONDS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECONDS),
            resync_interval: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let watch_namespace = lookup(WATCH_NAMESPACE_ENV)
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let concurrency = parse_number(&lookup, CONCURRENCY_ENV)?
            .map_or(Ok(DEFAULT_CONCURRENCY), u16::try_from)
            .map_err(|_| ControllerError::InvalidConfig(format!("{} is out of range", CONCURRENCY_ENV)))?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(format!("{} must be at least 1", CONCURRENCY_ENV)));
        }

        let backoff_min = parse_number(&lookup, BACKOFF_MIN_ENV)?.unwrap_or(DEFAULT_BACKOFF_MIN_SECONDS);
        let backoff_max = parse_number(&lookup, BACKOFF_MAX_ENV)?.unwrap_or(DEFAULT_BACKOFF_MAX_SECONDS);
        if backoff_min == 0 {
            return Err(ControllerError::InvalidConfig(format!("{} must be at least 1", BACKOFF_MIN_ENV)));
        }
        if backoff_max < backoff_min {
            return Err(ControllerError::InvalidConfig(format!(
                "{} ({}) must not be less than {} ({})",
                BACKOFF_MAX_ENV, backoff_max, BACKOFF_MIN_ENV, backoff_min
            )));
        }

        let resync_interval = match parse_number(&lookup, RESYNC_ENV)? {
            Some(0) => {
                return Err(ControllerError::InvalidConfig(format!("{} must be at least 1", RESYNC_ENV)));
            }
            Some(seconds) => Some(Duration::from_secs(seconds)),
            None => None,
        };

        Ok(Self {
            watch_namespace,
            concurrency,
            backoff_min: Duration::from_secs(backoff_min),
            backoff_max: Duration::from_secs(backoff_max),
            resync_interval,
        })
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>, ControllerError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            ControllerError::InvalidConfig(format!("{} must be a non-negative integer, got {:?}: {}", name, raw, e))
        }),
    }
}
