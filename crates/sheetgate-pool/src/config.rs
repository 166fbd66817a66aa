//! Connection Pool and rate-limit configuration.
//!
//! Env-driven, `from_env()` + builder pattern + `validate()`, mirroring the
//! shape of a `ConnectionPoolConfig` found elsewhere in this codebase's
//! lineage: defaults baked in as constants, every field overridable by an
//! environment variable, and a validation pass that never panics.

use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_PER_TENANT: usize = 10;
pub const DEFAULT_MAX_GLOBAL_CONNECTIONS: usize = 500;
pub const DEFAULT_CONNECTION_TTL_SECS: u64 = 300;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WAITER_HIGH_WATERMARK: usize = 64;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

pub const DEFAULT_PER_TENANT_MAX_REQUESTS: f64 = 80.0;
pub const DEFAULT_PER_TENANT_WINDOW_MS: u64 = 100_000;

/// Pool-wide configuration.
///
/// # Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SHEETGATE_POOL_MAX_CONCURRENT_PER_TENANT` | 10 | Per-tenant in-flight connection cap |
/// | `SHEETGATE_POOL_MAX_GLOBAL_CONNECTIONS` | 500 | Cap across all tenants |
/// | `SHEETGATE_POOL_CONNECTION_TTL_SECS` | 300 | Idle eviction threshold |
/// | `SHEETGATE_POOL_ACQUIRE_TIMEOUT_MS` | 10000 | Max wait for a permit |
/// | `SHEETGATE_POOL_WAITER_HIGH_WATERMARK` | 64 | Fail fast above this many waiters per tenant |
/// | `SHEETGATE_POOL_SWEEP_INTERVAL_SECS` | 5 | Idle-eviction sweep cadence |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_concurrent_per_tenant: usize,
    pub max_global_connections: usize,
    pub connection_ttl: Duration,
    pub acquire_timeout: Duration,
    pub waiter_high_watermark: usize,
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_tenant: DEFAULT_MAX_CONCURRENT_PER_TENANT,
            max_global_connections: DEFAULT_MAX_GLOBAL_CONNECTIONS,
            connection_ttl: Duration::from_secs(DEFAULT_CONNECTION_TTL_SECS),
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            waiter_high_watermark: DEFAULT_WAITER_HIGH_WATERMARK,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent_per_tenant: env_parse(
                "SHEETGATE_POOL_MAX_CONCURRENT_PER_TENANT",
                DEFAULT_MAX_CONCURRENT_PER_TENANT,
            ),
            max_global_connections: env_parse(
                "SHEETGATE_POOL_MAX_GLOBAL_CONNECTIONS",
                DEFAULT_MAX_GLOBAL_CONNECTIONS,
            ),
            connection_ttl: Duration::from_secs(env_parse(
                "SHEETGATE_POOL_CONNECTION_TTL_SECS",
                DEFAULT_CONNECTION_TTL_SECS,
            )),
            acquire_timeout: Duration::from_millis(env_parse(
                "SHEETGATE_POOL_ACQUIRE_TIMEOUT_MS",
                DEFAULT_ACQUIRE_TIMEOUT_MS,
            )),
            waiter_high_watermark: env_parse(
                "SHEETGATE_POOL_WAITER_HIGH_WATERMARK",
                DEFAULT_WAITER_HIGH_WATERMARK,
            ),
            sweep_interval: Duration::from_secs(env_parse(
                "SHEETGATE_POOL_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_per_tenant == 0 {
            return Err("max_concurrent_per_tenant must be > 0".to_string());
        }
        if self.max_global_connections < self.max_concurrent_per_tenant {
            return Err(
                "max_global_connections must be >= max_concurrent_per_tenant".to_string(),
            );
        }
        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be > 0".to_string());
        }
        if self.waiter_high_watermark == 0 {
            return Err("waiter_high_watermark must be > 0".to_string());
        }
        Ok(())
    }

    pub fn with_max_concurrent_per_tenant(mut self, max: usize) -> Self {
        self.max_concurrent_per_tenant = max;
        self
    }

    pub fn with_max_global_connections(mut self, max: usize) -> Self {
        self.max_global_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Per-tenant token-bucket rate-limit configuration.
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Tokens granted per `window`.
    pub per_tenant_max_requests: f64,
    pub per_tenant_window: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            per_tenant_max_requests: DEFAULT_PER_TENANT_MAX_REQUESTS,
            per_tenant_window: Duration::from_millis(DEFAULT_PER_TENANT_WINDOW_MS),
        }
    }
}

impl RateConfig {
    pub fn from_env() -> Self {
        Self {
            per_tenant_max_requests: env_parse(
                "SHEETGATE_RATE_PER_TENANT_MAX_REQUESTS",
                DEFAULT_PER_TENANT_MAX_REQUESTS,
            ),
            per_tenant_window: Duration::from_millis(env_parse(
                "SHEETGATE_RATE_PER_TENANT_WINDOW_MS",
                DEFAULT_PER_TENANT_WINDOW_MS,
            )),
        }
    }

    /// Tokens refilled per millisecond.
    pub fn refill_rate_per_ms(&self) -> f64 {
        self.per_tenant_max_requests / self.per_tenant_window.as_millis().max(1) as f64
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_config_validates() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn global_cap_below_per_tenant_cap_is_invalid() {
        let config = PoolConfig {
            max_global_connections: 1,
            max_concurrent_per_tenant: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rate_config_refill_rate() {
        let config = RateConfig {
            per_tenant_max_requests: 80.0,
            per_tenant_window: Duration::from_millis(100_000),
        };
        assert!((config.refill_rate_per_ms() - 0.0008).abs() < 1e-9);
    }
}
