//! Configuration module for uptrack.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use crate::aggregate::Resolution;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file (default: "uptrack.db")
    pub db_path: String,
    /// Seconds between scheduled probe batches (default: 30)
    pub probe_interval_secs: u64,
    /// Per-probe timeout in seconds (default: 10)
    pub probe_timeout_secs: u64,
    /// Maximum in-flight probes per batch (default: 10)
    pub probe_concurrency: usize,
    /// Default number of buckets for timelines (default: 24)
    pub bucket_count: usize,
    /// Default bucket resolution (default: hour)
    pub bucket_resolution: Resolution,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "uptrack.db".to_string(),
            probe_interval_secs: 30,
            probe_timeout_secs: 10,
            probe_concurrency: 10,
            bucket_count: 24,
            bucket_resolution: Resolution::Hour,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTRACK_DB_PATH`: Database file path
    /// - `UPTRACK_PROBE_INTERVAL_SECS`: Seconds between batches
    /// - `UPTRACK_PROBE_TIMEOUT_SECS`: Per-probe timeout in seconds
    /// - `UPTRACK_PROBE_CONCURRENCY`: Max in-flight probes per batch
    /// - `UPTRACK_BUCKET_COUNT`: Default timeline bucket count
    /// - `UPTRACK_BUCKET_RESOLUTION`: "hour" or "day"
    ///
    /// Invalid or non-positive values fall back to the defaults.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(db_path) = env::var("UPTRACK_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(interval) = parse_positive("UPTRACK_PROBE_INTERVAL_SECS") {
            cfg.probe_interval_secs = interval;
        }

        if let Some(timeout) = parse_positive("UPTRACK_PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout_secs = timeout;
        }

        if let Some(concurrency) = parse_positive("UPTRACK_PROBE_CONCURRENCY") {
            cfg.probe_concurrency = concurrency as usize;
        }

        if let Some(count) = parse_positive("UPTRACK_BUCKET_COUNT") {
            cfg.bucket_count = count as usize;
        }

        if let Ok(res_str) = env::var("UPTRACK_BUCKET_RESOLUTION") {
            if let Some(resolution) = Resolution::parse(&res_str) {
                cfg.bucket_resolution = resolution;
            }
        }

        cfg
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn parse_positive(var: &str) -> Option<u64> {
    env::var(var).ok()?.parse::<u64>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.db_path, "uptrack.db");
        assert_eq!(cfg.probe_interval_secs, 30);
        assert_eq!(cfg.probe_timeout_secs, 10);
        assert_eq!(cfg.probe_concurrency, 10);
        assert_eq!(cfg.bucket_count, 24);
        assert_eq!(cfg.bucket_resolution, Resolution::Hour);
    }

    #[test]
    fn test_durations() {
        let cfg = Config::default();
        assert_eq!(cfg.probe_interval(), Duration::from_secs(30));
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(10));
    }
}
