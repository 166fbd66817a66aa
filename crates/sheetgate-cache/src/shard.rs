//! Per-tenant cache shard.
//!
//! `Cache` keys its outer `DashMap` by tenant id, which already gives the
//! "segment lock keyed by `hash(tenantId)`" sharding the resource model
//! calls for -- each tenant's entries, LRU order, and tag index live behind
//! one shard.

use std::collections::{HashMap, HashSet};

use lru::LruCache;

use crate::entry::CacheEntry;
use crate::key::CacheKey;

pub(crate) struct TenantShard {
    pub lru: LruCache<CacheKey, CacheEntry>,
    /// dependency tag -> keys of entries carrying that tag, so invalidation
    /// never has to scan every entry in the tenant's shard.
    pub tag_index: HashMap<String, HashSet<CacheKey>>,
}

impl TenantShard {
    pub fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
            tag_index: HashMap::new(),
        }
    }

    /// Insert or replace the entry at `key`, returning the previous entry
    /// if one existed (its tags are cleaned up first).
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry> {
        let previous = self.remove(key);
        for tag in &entry.dependencies {
            self.tag_index.entry(tag.clone()).or_default().insert(key);
        }
        self.lru.put(key, entry);
        previous
    }

    pub fn remove(&mut self, key: CacheKey) -> Option<CacheEntry> {
        let entry = self.lru.pop(&key)?;
        self.untag(key, &entry);
        Some(entry)
    }

    pub fn evict_lru(&mut self) -> Option<(CacheKey, CacheEntry)> {
        let (key, entry) = self.lru.pop_lru()?;
        self.untag(key, &entry);
        Some((key, entry))
    }

    fn untag(&mut self, key: CacheKey, entry: &CacheEntry) {
        for tag in &entry.dependencies {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }

    /// Remove every entry carrying any of `tags`. Returns total freed size.
    pub fn invalidate_tags(&mut self, tags: &[String]) -> usize {
        let mut victims: HashSet<CacheKey> = HashSet::new();
        for tag in tags {
            if let Some(keys) = self.tag_index.get(tag) {
                victims.extend(keys.iter().copied());
            }
        }
        let mut freed = 0;
        for key in victims {
            if let Some(entry) = self.remove(key) {
                freed += entry.size;
            }
        }
        freed
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn total_size(&self) -> usize {
        self.lru.iter().map(|(_, e)| e.size).sum()
    }
}
