//! Process-level wiring.
//!
//! Builds the Registry, rate limiter, Connection Pool, Batch Coordinator,
//! and Cache exactly once at startup and hands back one `Arc<AppState<C>>`
//! cloned into every request. There is deliberately no other package-level
//! mutable state; everything reachable from a handler hangs off this
//! struct.

use std::sync::Arc;

use sheetgate_batch::{BatchConfig, BatchCoordinator};
use sheetgate_cache::{Cache, CacheConfig};
use sheetgate_core::{DocumentClient, EventBus, TenantRegistry};
use sheetgate_pool::{ConnectionPool, PoolConfig, RateConfig, RateLimiter};

use crate::metrics::TenantMetricsConfig;
use crate::signing::SigningKey;

/// Top-level, env-driven configuration for the whole process.
#[derive(Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub rate: RateConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub tenant_metrics: TenantMetricsConfig,
    pub signing_key: Option<SigningKey>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            pool: PoolConfig::from_env(),
            rate: RateConfig::from_env(),
            batch: BatchConfig::from_env(),
            cache: CacheConfig::from_env(),
            tenant_metrics: TenantMetricsConfig::from_env(),
            signing_key: SigningKey::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate()?;
        self.batch.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Shared application state, generic over the `DocumentClient` implementation
/// so tests can wire `FakeDocumentClient` while a production deployment
/// would wire a real Sheets-backed client.
pub struct AppState<C: DocumentClient + 'static> {
    pub registry: TenantRegistry,
    pub pool: Arc<ConnectionPool<C>>,
    pub batch: Arc<BatchCoordinator<C>>,
    pub cache: Arc<Cache>,
    pub config: AppConfig,
}

impl<C: DocumentClient + 'static> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            pool: self.pool.clone(),
            batch: self.batch.clone(),
            cache: self.cache.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: DocumentClient + 'static> AppState<C> {
    /// Build the full component graph and register the Cache as a
    /// `WriteObserver` on the event bus before it is shared, so every
    /// consumer of `event_bus` from this point on sees the invalidation
    /// path already wired.
    pub fn new(registry: TenantRegistry, client: Arc<C>, config: AppConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate.clone());
        let pool = ConnectionPool::new(
            registry.clone(),
            client.clone(),
            config.pool.clone(),
            rate_limiter,
        );

        let cache = Cache::new(config.cache.clone());

        let mut event_bus = EventBus::new();
        event_bus.register(cache.clone());
        let event_bus = Arc::new(event_bus);

        let batch = BatchCoordinator::new(pool.clone(), client, config.batch.clone(), event_bus);

        Self {
            registry,
            pool,
            batch,
            cache,
            config,
        }
    }

    /// Start background maintenance tasks (pool idle sweep, cache warm
    /// budget replenishment). Returns the handles so callers can abort
    /// them at shutdown.
    pub fn start_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.pool.start_sweep_task(),
            self.cache.start_warm_budget_task(),
        ]
    }
}
