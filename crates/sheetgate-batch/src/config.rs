//! Batch Coordinator configuration.

use std::time::Duration;

pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_BATCH_WAIT_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// # Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SHEETGATE_BATCH_DELAY_MS` | 100 | Debounce window before a queue flushes |
/// | `SHEETGATE_BATCH_MAX_SIZE` | 50 | Size trigger for an early flush |
/// | `SHEETGATE_BATCH_MAX_WAIT_MS` | 1000 | Hard ceiling, wins regardless of delay/size |
/// | `SHEETGATE_BATCH_MAX_BACKOFF_MS` | 5000 | Cap on rate-limit retry backoff |
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_delay: Duration,
    pub max_batch_size: usize,
    pub max_batch_wait: Duration,
    pub max_backoff: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait: Duration::from_millis(DEFAULT_MAX_BATCH_WAIT_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        Self {
            batch_delay: Duration::from_millis(env_parse(
                "SHEETGATE_BATCH_DELAY_MS",
                DEFAULT_BATCH_DELAY_MS,
            )),
            max_batch_size: env_parse("SHEETGATE_BATCH_MAX_SIZE", DEFAULT_MAX_BATCH_SIZE),
            max_batch_wait: Duration::from_millis(env_parse(
                "SHEETGATE_BATCH_MAX_WAIT_MS",
                DEFAULT_MAX_BATCH_WAIT_MS,
            )),
            max_backoff: Duration::from_millis(env_parse(
                "SHEETGATE_BATCH_MAX_BACKOFF_MS",
                DEFAULT_MAX_BACKOFF_MS,
            )),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be > 0".to_string());
        }
        if self.max_batch_wait < self.batch_delay {
            return Err("max_batch_wait must be >= batch_delay".to_string());
        }
        Ok(())
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
    fn default_validates() {
        assert!(BatchConfig::default().validate().is_ok());
    }

    #[test]
    fn wait_below_delay_is_invalid() {
        let config = BatchConfig {
            batch_delay: Duration::from_millis(200),
            max_batch_wait: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
