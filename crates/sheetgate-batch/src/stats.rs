//! Batch statistics, exposed via `stats()` and the `/admin/batch/stats` route.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchStats {
    pub enqueued: u64,
    pub flushed: u64,
    pub batches: u64,
    pub avg_batch_size: f64,
    pub errors: u64,
}

#[derive(Default)]
pub(crate) struct BatchStatsAtomic {
    pub enqueued: AtomicU64,
    pub flushed: AtomicU64,
    pub batches: AtomicU64,
    pub errors: AtomicU64,
}

impl BatchStatsAtomic {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_flush(&self, op_count: usize) {
        self.flushed.fetch_add(op_count as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchStats {
        let flushed = self.flushed.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        BatchStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            flushed,
            batches,
            avg_batch_size: if batches > 0 {
                flushed as f64 / batches as f64
            } else {
                0.0
            },
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
