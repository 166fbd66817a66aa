//! Cache configuration.

use std::time::Duration;

pub const DEFAULT_MAX_SIZE: usize = 50_000;
pub const DEFAULT_READ_TTL_SEC: u64 = 60;
pub const DEFAULT_WRITE_TTL_SEC: u64 = 10;
pub const DEFAULT_CONFIG_TTL_SEC: u64 = 300;
pub const DEFAULT_PREDICTION_THRESHOLD: u64 = 5;
pub const DEFAULT_WARMING_BATCH_SIZE: usize = 10;
pub const DEFAULT_FAIRNESS_SLACK: f64 = 1.5;

/// # Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SHEETGATE_CACHE_MAX_SIZE` | 50000 | Total entry budget across all tenants |
/// | `SHEETGATE_CACHE_READ_TTL_SEC` | 60 | TTL for ordinary reads |
/// | `SHEETGATE_CACHE_WRITE_TTL_SEC` | 10 | TTL for write-adjacent reads |
/// | `SHEETGATE_CACHE_CONFIG_TTL_SEC` | 300 | TTL for config-class reads |
/// | `SHEETGATE_CACHE_PREDICTION_THRESHOLD` | 5 | Sliding-window count that triggers a warm job |
/// | `SHEETGATE_CACHE_WARMING_BATCH_SIZE` | 10 | Rate tokens a warm cycle may spend |
/// | `SHEETGATE_CACHE_FAIRNESS_SLACK` | 1.5 | Multiplier on the fair share soft cap |
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub read_ttl: Duration,
    pub write_ttl: Duration,
    pub config_ttl: Duration,
    pub prediction_threshold: u64,
    pub warming_batch_size: usize,
    pub fairness_slack: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            read_ttl: Duration::from_secs(DEFAULT_READ_TTL_SEC),
            write_ttl: Duration::from_secs(DEFAULT_WRITE_TTL_SEC),
            config_ttl: Duration::from_secs(DEFAULT_CONFIG_TTL_SEC),
            prediction_threshold: DEFAULT_PREDICTION_THRESHOLD,
            warming_batch_size: DEFAULT_WARMING_BATCH_SIZE,
            fairness_slack: DEFAULT_FAIRNESS_SLACK,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            max_size: env_parse("SHEETGATE_CACHE_MAX_SIZE", DEFAULT_MAX_SIZE),
            read_ttl: Duration::from_secs(env_parse(
                "SHEETGATE_CACHE_READ_TTL_SEC",
                DEFAULT_READ_TTL_SEC,
            )),
            write_ttl: Duration::from_secs(env_parse(
                "SHEETGATE_CACHE_WRITE_TTL_SEC",
                DEFAULT_WRITE_TTL_SEC,
            )),
            config_ttl: Duration::from_secs(env_parse(
                "SHEETGATE_CACHE_CONFIG_TTL_SEC",
                DEFAULT_CONFIG_TTL_SEC,
            )),
            prediction_threshold: env_parse(
                "SHEETGATE_CACHE_PREDICTION_THRESHOLD",
                DEFAULT_PREDICTION_THRESHOLD,
            ),
            warming_batch_size: env_parse(
                "SHEETGATE_CACHE_WARMING_BATCH_SIZE",
                DEFAULT_WARMING_BATCH_SIZE,
            ),
            fairness_slack: env_parse("SHEETGATE_CACHE_FAIRNESS_SLACK", DEFAULT_FAIRNESS_SLACK),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be > 0".to_string());
        }
        if self.fairness_slack <= 0.0 {
            return Err("fairness_slack must be > 0".to_string());
        }
        Ok(())
    }

    /// The soft per-tenant cap: `maxSize / max(N, 1) * fairnessSlack`.
    pub fn fair_share(&self, tenant_count: usize) -> usize {
        let share = self.max_size as f64 / tenant_count.max(1) as f64 * self.fairness_slack;
        share.ceil() as usize
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
