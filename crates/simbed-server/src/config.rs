// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for simbed-server.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model library directory simulations load assets from
    pub models_dir: PathBuf,
    /// Directory experiment descriptors are resolved under
    pub experiments_dir: PathBuf,
    /// Timeout applied to runs whose request carries none
    pub default_timeout: Duration,
    /// How long an admission waits for a previous run's teardown
    pub teardown_wait: Duration,
    /// How often the watchdog checks the active run's kill deadline
    pub deadline_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SIMBED_MODELS_DIR`: model library directory
    /// - `SIMBED_EXPERIMENTS_DIR`: experiment descriptor directory
    ///
    /// Optional (with defaults):
    /// - `SIMBED_DEFAULT_TIMEOUT_SECS`: default run timeout (default: 600)
    /// - `SIMBED_TEARDOWN_WAIT_SECS`: bounded teardown wait (default: 60)
    /// - `SIMBED_DEADLINE_POLL_SECS`: watchdog poll interval (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let models_dir = PathBuf::from(
            std::env::var("SIMBED_MODELS_DIR")
                .map_err(|_| ConfigError::Missing("SIMBED_MODELS_DIR"))?,
        );

        let experiments_dir = PathBuf::from(
            std::env::var("SIMBED_EXPERIMENTS_DIR")
                .map_err(|_| ConfigError::Missing("SIMBED_EXPERIMENTS_DIR"))?,
        );

        let default_timeout = parse_secs("SIMBED_DEFAULT_TIMEOUT_SECS", 600)?;
        let teardown_wait = parse_secs("SIMBED_TEARDOWN_WAIT_SECS", 60)?;
        let deadline_poll_interval = parse_secs("SIMBED_DEADLINE_POLL_SECS", 5)?;

        Ok(Self {
            models_dir,
            experiments_dir,
            default_timeout,
            teardown_wait,
            deadline_poll_interval,
        })
    }
}

fn parse_secs(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid(var, "must be a non-negative number of seconds"))?,
        Err(_) => default,
    };
    Ok(Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SIMBED_MODELS_DIR", "/srv/simbed/models");
        guard.set("SIMBED_EXPERIMENTS_DIR", "/srv/simbed/experiments");
        guard.remove("SIMBED_DEFAULT_TIMEOUT_SECS");
        guard.remove("SIMBED_TEARDOWN_WAIT_SECS");
        guard.remove("SIMBED_DEADLINE_POLL_SECS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.models_dir, PathBuf::from("/srv/simbed/models"));
        assert_eq!(
            config.experiments_dir,
            PathBuf::from("/srv/simbed/experiments")
        );
        assert_eq!(config.default_timeout, Duration::from_secs(600));
        assert_eq!(config.teardown_wait, Duration::from_secs(60));
        assert_eq!(config.deadline_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SIMBED_MODELS_DIR", "/models");
        guard.set("SIMBED_EXPERIMENTS_DIR", "/experiments");
        guard.set("SIMBED_DEFAULT_TIMEOUT_SECS", "1800");
        guard.set("SIMBED_TEARDOWN_WAIT_SECS", "10");
        guard.set("SIMBED_DEADLINE_POLL_SECS", "1");

        let config = Config::from_env().unwrap();

        assert_eq!(config.default_timeout, Duration::from_secs(1800));
        assert_eq!(config.teardown_wait, Duration::from_secs(10));
        assert_eq!(config.deadline_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_config_missing_models_dir() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("SIMBED_MODELS_DIR");
        guard.set("SIMBED_EXPERIMENTS_DIR", "/experiments");

        let result = Config::from_env();
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SIMBED_MODELS_DIR")));
        assert!(err.to_string().contains("SIMBED_MODELS_DIR"));
    }

    #[test]
    fn test_config_missing_experiments_dir() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SIMBED_MODELS_DIR", "/models");
        guard.remove("SIMBED_EXPERIMENTS_DIR");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Missing("SIMBED_EXPERIMENTS_DIR")
        ));
    }

    #[test]
    fn test_config_invalid_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SIMBED_MODELS_DIR", "/models");
        guard.set("SIMBED_EXPERIMENTS_DIR", "/experiments");
        guard.set("SIMBED_DEFAULT_TIMEOUT_SECS", "soon");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid("SIMBED_DEFAULT_TIMEOUT_SECS", _)
        ));
    }

    #[test]
    fn test_config_negative_teardown_wait() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SIMBED_MODELS_DIR", "/models");
        guard.set("SIMBED_EXPERIMENTS_DIR", "/experiments");
        guard.set("SIMBED_TEARDOWN_WAIT_SECS", "-5");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
