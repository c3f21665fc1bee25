//! Server configuration
//!
//! Defines all configurable parameters for the control plane including the
//! bind address, database location, the working directory handed to job
//! subprocesses, and the scheduling/streaming intervals.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// SQLite database URL (e.g. "sqlite://winch.db")
    pub database_url: String,

    /// Working directory for job subprocesses; created if missing
    pub data_root: PathBuf,

    /// How often the scheduler looks for queued jobs
    pub schedule_interval: Duration,

    /// Fallback wakeup interval for streaming sessions; guards against
    /// lost change notifications
    pub stream_fallback: Duration,

    /// Ambient environment variables with this prefix become operator
    /// defaults for job environments
    pub job_env_prefix: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - WINCH_BIND_ADDR (default: 0.0.0.0:8080)
    /// - WINCH_DATABASE_URL (default: sqlite://winch.db)
    /// - WINCH_DATA_ROOT (default: ./data)
    /// - WINCH_SCHEDULE_INTERVAL_MS (default: 1000)
    /// - WINCH_STREAM_FALLBACK_MS (default: 500)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("WINCH_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = std::env::var("WINCH_DATABASE_URL").unwrap_or(defaults.database_url);

        let data_root = std::env::var("WINCH_DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_root);

        let schedule_interval = std::env::var("WINCH_SCHEDULE_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.schedule_interval);

        let stream_fallback = std::env::var("WINCH_STREAM_FALLBACK_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.stream_fallback);

        Self {
            bind_addr,
            database_url,
            data_root,
            schedule_interval,
            stream_fallback,
            job_env_prefix: defaults.job_env_prefix,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must be a sqlite: URL");
        }

        if self.schedule_interval.is_zero() {
            anyhow::bail!("schedule_interval must be greater than 0");
        }

        if self.stream_fallback.is_zero() {
            anyhow::bail!("stream_fallback must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://winch.db".to_string(),
            data_root: PathBuf::from("./data"),
            schedule_interval: Duration::from_secs(1),
            stream_fallback: Duration::from_millis(500),
            job_env_prefix: "WINCH_JOB_ENV_".to_string(),
        }
    }
}
