//! Prometheus metrics for the admin surface.
//!
//! # Cardinality warning
//!
//! Several gauges below are labeled by `tenant_id`. Every distinct tenant
//! that ever calls `observe_*` creates a new Prometheus time series that
//! persists for the life of the process. Above a few thousand tenants this
//! becomes an expensive scrape and an expensive storage burden on whatever
//! is ingesting `/admin/metrics`. `TenantMetricsConfig` lets an operator
//! turn per-tenant labels off in favor of a single `"aggregated"` series
//! once tenant count outgrows what the scrape target can hold; there is no
//! automatic rotation or eviction of old tenant label values.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram_vec, Encoder, Gauge, GaugeVec,
    HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref POOL_CONNECTIONS_TOTAL: Gauge = register_gauge!(
        "sheetgate_pool_connections_total",
        "Connections currently held by the pool, idle or active."
    )
    .unwrap();
    pub static ref POOL_CONNECTIONS_ACTIVE: Gauge = register_gauge!(
        "sheetgate_pool_connections_active",
        "Connections currently checked out."
    )
    .unwrap();
    pub static ref POOL_HIT_RATE: Gauge = register_gauge!(
        "sheetgate_pool_hit_rate",
        "Fraction of acquires served by an idle connection rather than a fresh open()."
    )
    .unwrap();
    pub static ref POOL_RATE_LIMITED_TOTAL: Gauge = register_gauge!(
        "sheetgate_pool_rate_limited_total",
        "Acquires rejected because the tenant's token bucket was empty."
    )
    .unwrap();
    pub static ref BATCH_QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "sheetgate_batch_queue_depth",
        "Pending operations per tenant, summed across all sheets.",
        &["tenant_id"]
    )
    .unwrap();
    pub static ref BATCH_AVG_SIZE: Gauge = register_gauge!(
        "sheetgate_batch_avg_flush_size",
        "Mean number of operations coalesced per flush."
    )
    .unwrap();
    pub static ref BATCH_FLUSH_LATENCY: HistogramVec = register_histogram_vec!(
        "sheetgate_batch_flush_latency_seconds",
        "Time from a queue's first enqueue in a cycle to that cycle's flush.",
        &["tenant_id"]
    )
    .unwrap();
    pub static ref CACHE_HIT_RATE: Gauge =
        register_gauge!("sheetgate_cache_hit_rate", "Cache hit rate since process start.").unwrap();
    pub static ref CACHE_ENTRIES: Gauge = register_gauge!(
        "sheetgate_cache_entries",
        "Entries currently held across all tenants."
    )
    .unwrap();
    pub static ref CACHE_SIZE_BYTES: Gauge = register_gauge!(
        "sheetgate_cache_size_bytes",
        "Approximate serialized size of all cached entries."
    )
    .unwrap();
    pub static ref CACHE_ENTRIES_BY_TENANT: GaugeVec = register_gauge_vec!(
        "sheetgate_cache_entries_by_tenant",
        "Entries held per tenant. See module docs on cardinality.",
        &["tenant_id"]
    )
    .unwrap();
}

/// Controls whether per-tenant labels are emitted at all. Defaults to on;
/// an operator with a large tenant count should flip this off rather than
/// let the series count grow unbounded.
#[derive(Debug, Clone, Copy)]
pub struct TenantMetricsConfig {
    pub include_tenant_id: bool,
}

impl TenantMetricsConfig {
    pub fn from_env() -> Self {
        let include_tenant_id = std::env::var("SHEETGATE_METRICS_INCLUDE_TENANT_ID")
            .ok()
            .map(|v| v != "0" && v.to_ascii_lowercase() != "false")
            .unwrap_or(true);
        Self { include_tenant_id }
    }

    fn label<'a>(&self, tenant_id: &'a str) -> &'a str {
        if self.include_tenant_id {
            tenant_id
        } else {
            "aggregated"
        }
    }
}

pub fn observe_batch_queue_depth(config: &TenantMetricsConfig, tenant_id: &str, depth: usize) {
    BATCH_QUEUE_DEPTH
        .with_label_values(&[config.label(tenant_id)])
        .set(depth as f64);
}

pub fn observe_cache_entries_for_tenant(config: &TenantMetricsConfig, tenant_id: &str, count: usize) {
    CACHE_ENTRIES_BY_TENANT
        .with_label_values(&[config.label(tenant_id)])
        .set(count as f64);
}

/// Refresh the process-wide gauges from the current snapshots. Called on
/// every `/admin/metrics` scrape rather than on a background timer, so the
/// numbers are always scrape-fresh without needing a dedicated poller.
pub fn refresh_from_snapshots(
    pool_stats: &sheetgate_pool::PoolStats,
    batch_stats: &sheetgate_batch::BatchStats,
    cache_stats: &sheetgate_cache::CacheStats,
    tenant_metrics: &TenantMetricsConfig,
) {
    POOL_CONNECTIONS_TOTAL.set(pool_stats.total as f64);
    POOL_CONNECTIONS_ACTIVE.set(pool_stats.active as f64);
    let pool_total_ops = pool_stats.hits + pool_stats.misses;
    POOL_HIT_RATE.set(if pool_total_ops == 0 {
        0.0
    } else {
        pool_stats.hits as f64 / pool_total_ops as f64
    });
    POOL_RATE_LIMITED_TOTAL.set(pool_stats.rate_limited as f64);

    BATCH_AVG_SIZE.set(batch_stats.avg_batch_size);

    CACHE_HIT_RATE.set(cache_stats.hit_rate);
    CACHE_ENTRIES.set(cache_stats.entries as f64);
    CACHE_SIZE_BYTES.set(cache_stats.size as f64);
    for (tenant_id, count) in &cache_stats.by_tenant {
        observe_cache_entries_for_tenant(tenant_metrics, tenant_id, *count);
    }
}

/// Render the current registry in the Prometheus text exposition format.
pub fn encode() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap_or_default()
}
