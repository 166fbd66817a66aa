//! SheetGate Tenant-Isolated Cache
//!
//! Serves repeat reads from memory, keyed so two tenants can never collide
//! into the same entry, and invalidates deterministically via the rule
//! table in `rules` whenever the Batch Coordinator emits a write event.

pub mod cache;
pub mod config;
pub mod entry;
pub mod key;
pub mod rules;
mod shard;
pub mod stats;
pub mod warmer;

pub use cache::Cache;
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use key::{cache_key, CacheKey, RouteClass};
pub use stats::CacheStats;
pub use warmer::Warmer;
