//! Cached entries.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::key::RouteClass;

/// A single cached value plus the bookkeeping needed to expire and
/// invalidate it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: Instant,
    /// Rough byte estimate used for the size budget; not exact memory
    /// accounting, just enough to keep `maxSize` meaningful across entries
    /// of very different shapes.
    pub size: usize,
    pub dependencies: HashSet<String>,
    pub route_class: RouteClass,
    /// Set when a rule invalidation couldn't be applied cleanly and the
    /// entry must be treated as a miss on next read rather than served.
    pub must_revalidate: bool,
}

impl CacheEntry {
    pub fn new(
        value: serde_json::Value,
        ttl: Duration,
        dependencies: HashSet<String>,
        route_class: RouteClass,
    ) -> Self {
        let size = estimate_size(&value);
        Self {
            value,
            expires_at: Instant::now() + ttl,
            size,
            dependencies,
            route_class,
            must_revalidate: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn is_servable(&self) -> bool {
        !self.must_revalidate && !self.is_expired()
    }
}

fn estimate_size(value: &serde_json::Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(64)
}
