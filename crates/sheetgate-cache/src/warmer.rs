//! Predictive warming.
//!
//! Tracks sliding-window access counts per `(tenant, path-template)`. Once a
//! pattern crosses `predictionThreshold`, a low-priority warm job re-runs
//! the read through a caller-supplied `Warmer` and populates the cache --
//! this is advisory only; nothing depends on warm jobs actually running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;

/// Re-runs a read to populate the cache ahead of demand. Implemented by
/// whatever SheetGate component actually serves the route being warmed.
#[async_trait]
pub trait Warmer: Send + Sync {
    async fn warm(&self, tenant_id: &str, path_template: &str);
}

struct Window {
    count: u64,
    window_start: Instant,
}

/// Sliding-window counter keyed by `(tenant, path-template)`. The window
/// resets (rather than decaying continuously) once it's older than
/// `window_len` -- simple and matches the "count crosses threshold" wording
/// in the spec more directly than a decaying-rate model would.
pub(crate) struct PatternCounter {
    windows: Mutex<HashMap<(String, String), Window>>,
    window_len: Duration,
}

impl PatternCounter {
    pub fn new(window_len: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window_len,
        }
    }

    /// Records one access and returns `true` exactly once per window, the
    /// moment the count crosses `threshold`.
    pub fn record(&self, tenant_id: &str, path_template: &str, threshold: u64) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let key = (tenant_id.to_string(), path_template.to_string());
        let now = Instant::now();
        let entry = windows.entry(key).or_insert_with(|| Window {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) > self.window_len {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count == threshold
    }
}

/// Spends at most `warming_batch_size` warm jobs per window and lets every
/// outstanding job be cancelled (e.g. on tenant removal).
pub(crate) struct WarmScheduler {
    warmer: Option<Arc<dyn Warmer>>,
    budget: Arc<AtomicUsize>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WarmScheduler {
    pub fn new(warmer: Option<Arc<dyn Warmer>>, warming_batch_size: usize) -> Self {
        Self {
            warmer,
            budget: Arc::new(AtomicUsize::new(warming_batch_size)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replenish the per-window rate budget. Called on the same cadence as
    /// the pattern counter's window.
    pub fn replenish(&self, warming_batch_size: usize) {
        self.budget.store(warming_batch_size, Ordering::Relaxed);
    }

    pub fn schedule(&self, tenant_id: String, path_template: String) {
        let Some(warmer) = self.warmer.clone() else {
            return;
        };

        loop {
            let current = self.budget.load(Ordering::Relaxed);
            if current == 0 {
                return;
            }
            if self
                .budget
                .compare_exchange(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        let handle = tokio::spawn(async move {
            warmer.warm(&tenant_id, &path_template).await;
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Cancel every still-running warm job.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_threshold_exactly_once_per_window() {
        let counter = PatternCounter::new(Duration::from_secs(60));
        let mut crossings = 0;
        for _ in 0..5 {
            if counter.record("t1", "/rows", 3) {
                crossings += 1;
            }
        }
        assert_eq!(crossings, 1);
    }

    #[tokio::test]
    async fn schedule_respects_budget() {
        struct NoopWarmer(AtomicUsize);
        #[async_trait]
        impl Warmer for NoopWarmer {
            async fn warm(&self, _tenant_id: &str, _path_template: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let warmer = Arc::new(NoopWarmer(AtomicUsize::new(0)));
        let scheduler = WarmScheduler::new(Some(warmer.clone()), 2);

        scheduler.schedule("t1".into(), "/rows".into());
        scheduler.schedule("t1".into(), "/rows".into());
        scheduler.schedule("t1".into(), "/rows".into());

        assert_eq!(scheduler.budget.load(Ordering::Relaxed), 0);
    }
}
