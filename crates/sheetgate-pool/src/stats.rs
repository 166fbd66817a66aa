//! Pool statistics, exposed via `stats()` and the `/admin/pool/stats` route.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    pub pools: u64,
    pub total: u64,
    pub active: u64,
    pub idle: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rate_limited: u64,
}

#[derive(Default)]
pub(crate) struct PoolStatsAtomic {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub rate_limited: AtomicU64,
}

impl PoolStatsAtomic {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.rate_limited.load(Ordering::Relaxed),
        )
    }
}
