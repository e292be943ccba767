//! Worker configuration loading.
//!
//! | variable | default |
//! |----------|---------|
//! | `PENALTY_INTERVAL_SECS` | `3600` (at most 30 days) |
//! | `PENALTY_MAX_CONCURRENT` | `16` |
//! | `PENALTY_RUN_ON_STARTUP` | `false` |
//! | `DATABASE_URL` | unset (in-memory store) |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |

use std::time::Duration;

use thiserror::Error;

use crate::penalties::{EnforcementJobConfig, PenaltyScheduler};

pub const PENALTY_INTERVAL_SECS: &str = "PENALTY_INTERVAL_SECS";
pub const PENALTY_MAX_CONCURRENT: &str = "PENALTY_MAX_CONCURRENT";
pub const PENALTY_RUN_ON_STARTUP: &str = "PENALTY_RUN_ON_STARTUP";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        ConfigError::Invalid {
            var,
            value: value.into(),
            expected,
        }
    }
}

/// Penalty worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Time between scheduled runs
    pub interval: Duration,
    /// Maximum penalty batches in flight within one run
    pub max_concurrent: usize,
    /// Run once immediately at startup
    pub run_on_startup: bool,
    /// Postgres document store; in-memory when `None`
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            max_concurrent: 16,
            run_on_startup: false,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl WorkerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let interval = match get(PENALTY_INTERVAL_SECS) {
            Some(raw) => {
                let secs = parse_positive(PENALTY_INTERVAL_SECS, &raw)?;
                if secs > PenaltyScheduler::MAX_INTERVAL.as_secs() {
                    return Err(ConfigError::invalid(
                        PENALTY_INTERVAL_SECS,
                        raw,
                        "at most 2592000 seconds (30 days)",
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.interval,
        };
        let max_concurrent = match get(PENALTY_MAX_CONCURRENT) {
            Some(raw) => parse_positive(PENALTY_MAX_CONCURRENT, &raw)? as usize,
            None => defaults.max_concurrent,
        };
        let run_on_startup = match get(PENALTY_RUN_ON_STARTUP) {
            Some(raw) => parse_bool(PENALTY_RUN_ON_STARTUP, &raw)?,
            None => defaults.run_on_startup,
        };
        let database_max_connections = match get(DATABASE_MAX_CONNECTIONS) {
            Some(raw) => u32::try_from(parse_positive(DATABASE_MAX_CONNECTIONS, &raw)?)
                .map_err(|_| ConfigError::invalid(DATABASE_MAX_CONNECTIONS, raw, "a 32-bit integer"))?,
            None => defaults.database_max_connections,
        };

        Ok(Self {
            interval,
            max_concurrent,
            run_on_startup,
            database_url: get(DATABASE_URL),
            database_max_connections,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_run_on_startup(mut self, run_on_startup: bool) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    pub fn job_config(&self) -> EnforcementJobConfig {
        EnforcementJobConfig::default().with_max_concurrent(self.max_concurrent)
    }

    pub fn scheduler(&self) -> PenaltyScheduler {
        PenaltyScheduler::default()
            .with_interval(self.interval)
            .with_run_on_startup(self.run_on_startup)
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::invalid(var, raw, "a positive integer")),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, raw, "a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(load(&[]).unwrap(), WorkerConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            (PENALTY_INTERVAL_SECS, "60"),
            (PENALTY_MAX_CONCURRENT, "4"),
            (PENALTY_RUN_ON_STARTUP, "true"),
            (DATABASE_URL, "postgres://localhost/tasks"),
            (DATABASE_MAX_CONNECTIONS, "3"),
        ])
        .unwrap();

        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent, 4);
        assert!(config.run_on_startup);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/tasks"));
        assert_eq!(config.database_max_connections, 3);
        assert_eq!(config.job_config().max_concurrent, 4);
        assert_eq!(config.scheduler().interval, Duration::from_secs(60));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(matches!(
            load(&[(PENALTY_INTERVAL_SECS, "0")]),
            Err(ConfigError::Invalid { var: PENALTY_INTERVAL_SECS, .. })
        ));
        assert!(load(&[(PENALTY_MAX_CONCURRENT, "many")]).is_err());
        assert!(load(&[(PENALTY_RUN_ON_STARTUP, "maybe")]).is_err());
    }

    #[test]
    fn interval_is_bounded() {
        assert!(matches!(
            load(&[(PENALTY_INTERVAL_SECS, "18446744073709551615")]),
            Err(ConfigError::Invalid { var: PENALTY_INTERVAL_SECS, .. })
        ));
        assert!(load(&[(PENALTY_INTERVAL_SECS, "2592001")]).is_err());

        let config = load(&[(PENALTY_INTERVAL_SECS, "2592000")]).unwrap();
        assert_eq!(config.interval, PenaltyScheduler::MAX_INTERVAL);
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert_eq!(load(&[(DATABASE_URL, "  ")]).unwrap().database_url, None);
    }
}
