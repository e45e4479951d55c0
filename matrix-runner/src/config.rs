//! Runner settings
//!
//! Tunables for a matrix run: which container engine to drive, where source
//! packages and scratch files live, service ports, and every timeout and
//! retry budget. Credentials and version tags live in `PipelineConfig`.

use anyhow::{Context, Result};
use matrix_core::retry::RetryPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runner settings
///
/// All timeouts and intervals are configurable so slow CI hosts (cold image
/// pulls, slow builds) can be accommodated without code changes.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Container engine binary (podman or docker)
    pub engine: String,

    /// Directory holding the source project zips
    pub packages_dir: PathBuf,

    /// Base directory for per-case scratch directories
    pub work_dir: PathBuf,

    /// Port the build service listens on inside its container
    pub build_port: u16,

    /// Port the application listens on inside the runtime container
    pub runtime_port: u16,

    /// How long a container may take to accept connections
    pub container_start_timeout: Duration,

    /// How often readiness is probed while a container starts
    pub readiness_interval: Duration,

    /// Overall bound on a remote build
    pub build_timeout: Duration,

    /// Interval between build-status polls
    pub build_poll_interval: Duration,

    /// Health-check attempt budget
    pub health_max_attempts: u32,

    pub health_initial_interval: Duration,
    pub health_max_interval: Duration,

    /// Attempt budget for transient HTTP failures
    pub http_retry_attempts: u32,

    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: "podman".to_string(),
            packages_dir: PathBuf::from("packages"),
            work_dir: std::env::temp_dir().join("kudulite-matrix"),
            build_port: 8181,
            runtime_port: 80,
            container_start_timeout: Duration::from_secs(120),
            readiness_interval: Duration::from_secs(1),
            build_timeout: Duration::from_secs(900),
            build_poll_interval: Duration::from_secs(5),
            health_max_attempts: 30,
            health_initial_interval: Duration::from_secs(2),
            health_max_interval: Duration::from_secs(15),
            http_retry_attempts: 5,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Creates settings from environment variables
    ///
    /// Every variable is optional:
    /// - CONTAINER_ENGINE (default: podman)
    /// - PACKAGES_DIR (default: ./packages)
    /// - WORK_DIR (default: <tmp>/kudulite-matrix)
    /// - BUILD_SERVICE_PORT (default: 8181)
    /// - RUNTIME_PORT (default: 80)
    /// - CONTAINER_START_TIMEOUT (seconds, default: 120)
    /// - BUILD_TIMEOUT (seconds, default: 900)
    /// - BUILD_POLL_INTERVAL (seconds, default: 5)
    /// - HEALTH_MAX_ATTEMPTS (default: 30)
    /// - HTTP_RETRY_ATTEMPTS (default: 5)
    /// - HTTP_TIMEOUT (seconds, default: 30)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let settings = Self {
            engine: var("CONTAINER_ENGINE").unwrap_or(defaults.engine),
            packages_dir: var("PACKAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.packages_dir),
            work_dir: var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            build_port: parse_var(&var, "BUILD_SERVICE_PORT", defaults.build_port)?,
            runtime_port: parse_var(&var, "RUNTIME_PORT", defaults.runtime_port)?,
            container_start_timeout: secs_var(
                &var,
                "CONTAINER_START_TIMEOUT",
                defaults.container_start_timeout,
            )?,
            readiness_interval: defaults.readiness_interval,
            build_timeout: secs_var(&var, "BUILD_TIMEOUT", defaults.build_timeout)?,
            build_poll_interval: secs_var(
                &var,
                "BUILD_POLL_INTERVAL",
                defaults.build_poll_interval,
            )?,
            health_max_attempts: parse_var(
                &var,
                "HEALTH_MAX_ATTEMPTS",
                defaults.health_max_attempts,
            )?,
            health_initial_interval: defaults.health_initial_interval,
            health_max_interval: defaults.health_max_interval,
            http_retry_attempts: parse_var(
                &var,
                "HTTP_RETRY_ATTEMPTS",
                defaults.http_retry_attempts,
            )?,
            http_timeout: secs_var(&var, "HTTP_TIMEOUT", defaults.http_timeout)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            anyhow::bail!("CONTAINER_ENGINE cannot be empty");
        }

        if self.build_port == 0 || self.runtime_port == 0 {
            anyhow::bail!("service ports must be greater than 0");
        }

        if self.container_start_timeout.is_zero() {
            anyhow::bail!("CONTAINER_START_TIMEOUT must be greater than 0");
        }

        if self.build_poll_interval.is_zero() {
            anyhow::bail!("BUILD_POLL_INTERVAL must be greater than 0");
        }

        if self.build_timeout < self.build_poll_interval {
            anyhow::bail!("BUILD_TIMEOUT must be at least BUILD_POLL_INTERVAL");
        }

        if self.health_max_attempts == 0 {
            anyhow::bail!("HEALTH_MAX_ATTEMPTS must be greater than 0");
        }

        if self.http_retry_attempts == 0 {
            anyhow::bail!("HTTP_RETRY_ATTEMPTS must be greater than 0");
        }

        Ok(())
    }

    /// Fixed-interval build-status polling bounded by the build timeout
    pub fn build_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::until(self.build_poll_interval, self.build_timeout)
    }

    /// Exponential backoff for transient HTTP failures
    pub fn transport_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            Duration::from_secs(1),
            Duration::from_secs(16),
            self.http_retry_attempts,
        )
    }

    /// Exponential backoff for health checks
    pub fn health_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.health_initial_interval,
            self.health_max_interval,
            self.health_max_attempts,
        )
    }
}

fn parse_var<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", name, raw)),
        None => Ok(default),
    }
}

fn secs_var<F>(var: &F, name: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(var, name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.engine, "podman");
        assert_eq!(settings.build_port, 8181);
        assert_eq!(settings.runtime_port, 80);
        assert_eq!(settings.build_timeout, Duration::from_secs(900));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("CONTAINER_ENGINE", "docker"),
            ("BUILD_TIMEOUT", "60"),
            ("BUILD_POLL_INTERVAL", "2"),
            ("HEALTH_MAX_ATTEMPTS", "3"),
            ("PACKAGES_DIR", "/srv/zips"),
        ]))
        .unwrap();

        assert_eq!(settings.engine, "docker");
        assert_eq!(settings.packages_dir, PathBuf::from("/srv/zips"));

        let poll = settings.build_poll_policy();
        assert_eq!(poll.deadline, Some(Duration::from_secs(60)));
        assert_eq!(poll.initial_interval, Duration::from_secs(2));
        assert_eq!(settings.health_policy().max_attempts, 3);
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = Settings::from_lookup(lookup(&[("RUNTIME_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("RUNTIME_PORT"));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.build_poll_interval = Duration::ZERO;
        assert!(settings.validate().is_err());

        settings.build_poll_interval = Duration::from_secs(10);
        settings.build_timeout = Duration::from_secs(5);
        assert!(settings.validate().is_err());

        settings.build_timeout = Duration::from_secs(600);
        settings.health_max_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
