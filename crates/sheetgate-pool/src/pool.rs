//! Connection Pool.
//!
//! Lends bounded, rate-safe document handles to callers, hiding
//! authentication and reconnection. Built around the same shape used
//! elsewhere in this codebase for pooled resources: a semaphore per
//! logical owner (here, per tenant) and an mpsc channel that lets the
//! synchronous `Drop` impl on `PooledConnection` hand a slot back to an
//! async reconciliation loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use sheetgate_core::document_client::Handle;
use sheetgate_core::{DocumentClient, SheetGateError, TenantRegistry};
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::config::PoolConfig;
use crate::connection::{ConnectionSlot, PooledConnection, ReturnMsg};
use crate::rate_limiter::RateLimiter;
use crate::retry_policy::{ErrorClass, RetryPolicy};
use crate::stats::{PoolStats, PoolStatsAtomic};

/// Per-tenant pool bookkeeping: the semaphore bounding concurrent in-use
/// connections, and the FIFO waiter count used for the backpressure
/// high-watermark check.
struct TenantState {
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl TenantState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            waiting: AtomicUsize::new(0),
        }
    }
}

/// The Connection Pool.
///
/// `C` is the `DocumentClient` implementation; production wires a real
/// Sheets client, tests wire `sheetgate_core::document_client::fake::FakeDocumentClient`.
pub struct ConnectionPool<C: DocumentClient + 'static> {
    registry: TenantRegistry,
    client: Arc<C>,
    config: PoolConfig,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    tenant_states: DashMap<String, Arc<TenantState>>,
    idle: Mutex<HashMap<String, VecDeque<ConnectionSlot>>>,
    global_count: AtomicUsize,
    stats: PoolStatsAtomic,
    return_tx: mpsc::UnboundedSender<(String, ReturnMsg)>,
    return_rx: Mutex<Option<mpsc::UnboundedReceiver<(String, ReturnMsg)>>>,
}

impl<C: DocumentClient + 'static> ConnectionPool<C> {
    pub fn new(
        registry: TenantRegistry,
        client: Arc<C>,
        config: PoolConfig,
        rate_limiter: RateLimiter,
    ) -> Arc<Self> {
        let (return_tx, return_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry,
            client,
            config,
            rate_limiter,
            retry_policy: RetryPolicy::default(),
            tenant_states: DashMap::new(),
            idle: Mutex::new(HashMap::new()),
            global_count: AtomicUsize::new(0),
            stats: PoolStatsAtomic::default(),
            return_tx,
            return_rx: Mutex::new(Some(return_rx)),
        })
    }

    /// The retry/backoff policy this pool consults on `open()` failures,
    /// shared with the Batch Coordinator so both components classify
    /// remote failures the same way.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn tenant_state(&self, tenant_id: &str) -> Arc<TenantState> {
        self.tenant_states
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantState::new(self.config.max_concurrent_per_tenant)))
            .clone()
    }

    /// Acquire a pooled connection for `tenant_id`.
    ///
    /// Fails with `tenant-unknown`, `rate-limited`, `pool-exhausted`, or
    /// `auth-failure`, per the taxonomy.
    pub async fn acquire(
        self: &Arc<Self>,
        tenant_id: &str,
    ) -> Result<PooledConnection<C>, SheetGateError> {
        let tenant = self.registry.resolve(tenant_id)?;
        if !tenant.enabled {
            // A disabled tenant must not produce outbound traffic; treated
            // as unknown rather than inventing a new taxonomy member.
            return Err(SheetGateError::TenantUnknown(tenant_id.to_string()));
        }

        if let Err(retry_after) = self.rate_limiter.try_consume(tenant_id) {
            self.stats.record_rate_limited();
            return Err(SheetGateError::RateLimited {
                tenant_id: tenant_id.to_string(),
                retry_after,
            });
        }

        self.process_returns().await;

        let state = self.tenant_state(tenant_id);

        if state.waiting.load(Ordering::Relaxed) >= self.config.waiter_high_watermark {
            return Err(SheetGateError::PoolExhausted {
                tenant_id: tenant_id.to_string(),
                retry_after: self.config.acquire_timeout,
            });
        }

        state.waiting.fetch_add(1, Ordering::Relaxed);
        let permit_result = tokio::time::timeout(
            self.config.acquire_timeout,
            state.semaphore.clone().acquire_owned(),
        )
        .await;
        state.waiting.fetch_sub(1, Ordering::Relaxed);

        let permit = match permit_result {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                return Err(SheetGateError::PoolExhausted {
                    tenant_id: tenant_id.to_string(),
                    retry_after: self.config.acquire_timeout,
                });
            }
        };

        let slot = self.take_or_create(&tenant_id.to_string(), &tenant.sheet_ref).await?;

        Ok(PooledConnection::new(
            slot,
            self.return_tx.clone(),
            permit,
            self.client.clone(),
        ))
    }

    async fn take_or_create(
        &self,
        tenant_id: &str,
        sheet_ref: &str,
    ) -> Result<ConnectionSlot, SheetGateError> {
        {
            let mut idle = self.idle.lock().await;
            if let Some(queue) = idle.get_mut(tenant_id) {
                while let Some(slot) = queue.pop_front() {
                    if slot.is_idle_expired(self.config.connection_ttl) {
                        self.global_count.fetch_sub(1, Ordering::Relaxed);
                        continue;
                    }
                    self.stats.record_hit();
                    return Ok(slot);
                }
            }
        }

        if self.global_count.load(Ordering::Relaxed) >= self.config.max_global_connections
            && !self.evict_one_idle().await
        {
            return Err(SheetGateError::PoolExhausted {
                tenant_id: tenant_id.to_string(),
                retry_after: self.config.acquire_timeout,
            });
        }

        let handle = self.open_with_retry(tenant_id, sheet_ref).await?;

        self.global_count.fetch_add(1, Ordering::Relaxed);
        self.stats.record_miss();
        Ok(ConnectionSlot::new(tenant_id.to_string(), handle))
    }

    /// Open a remote session for `tenant_id`, retrying once on a transient
    /// or auth failure per §4.2. A rate limit surfaces as
    /// `SheetGateError::RateLimited`; a fatal failure surfaces as
    /// `SheetGateError::AuthFailure` and marks the tenant's idle
    /// connections unusable so a later acquire doesn't hand one out.
    async fn open_with_retry(&self, tenant_id: &str, sheet_ref: &str) -> Result<Handle, SheetGateError> {
        let first_err = match self.client.open(sheet_ref).await {
            Ok(handle) => return Ok(handle),
            Err(err) => err,
        };

        match self.retry_policy.classify(&first_err) {
            ErrorClass::RateLimited(retry_after) => {
                return Err(SheetGateError::RateLimited {
                    tenant_id: tenant_id.to_string(),
                    retry_after,
                });
            }
            ErrorClass::Fatal => {
                self.clear(tenant_id).await;
                return Err(SheetGateError::AuthFailure {
                    tenant_id: tenant_id.to_string(),
                    message: first_err.to_string(),
                });
            }
            ErrorClass::Transient | ErrorClass::Auth => {}
        }

        match self.client.open(sheet_ref).await {
            Ok(handle) => Ok(handle),
            Err(second_err) => match self.retry_policy.classify(&second_err) {
                ErrorClass::RateLimited(retry_after) => Err(SheetGateError::RateLimited {
                    tenant_id: tenant_id.to_string(),
                    retry_after,
                }),
                ErrorClass::Fatal => {
                    self.clear(tenant_id).await;
                    Err(SheetGateError::AuthFailure {
                        tenant_id: tenant_id.to_string(),
                        message: second_err.to_string(),
                    })
                }
                ErrorClass::Transient | ErrorClass::Auth => Err(SheetGateError::AuthFailure {
                    tenant_id: tenant_id.to_string(),
                    message: second_err.to_string(),
                }),
            },
        }
    }

    /// Evict one globally least-recently-used idle connection to make room
    /// for a new one. Returns `true` if a victim was found and closed.
    async fn evict_one_idle(&self) -> bool {
        let mut idle = self.idle.lock().await;
        let mut victim: Option<(String, usize, Instant)> = None;
        for (tenant_id, queue) in idle.iter() {
            if let Some((idx, slot)) = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.last_used_at)
            {
                let is_older = victim
                    .as_ref()
                    .map(|(_, _, t)| slot.last_used_at < *t)
                    .unwrap_or(true);
                if is_older {
                    victim = Some((tenant_id.clone(), idx, slot.last_used_at));
                }
            }
        }

        if let Some((tenant_id, idx, _)) = victim {
            if let Some(queue) = idle.get_mut(&tenant_id) {
                if let Some(slot) = queue.remove(idx) {
                    drop(idle);
                    let _ = self.client.close(&slot.handle).await;
                    self.global_count.fetch_sub(1, Ordering::Relaxed);
                    self.stats.record_eviction();
                    return true;
                }
            }
        }
        false
    }

    /// Drain the return channel, reconciling each returned slot: put it
    /// back in the idle set if healthy, fresh, and the tenant still
    /// exists; otherwise close it.
    pub async fn process_returns(&self) {
        let mut rx_guard = self.return_rx.lock().await;
        let Some(rx) = rx_guard.as_mut() else {
            return;
        };

        let mut reclaimed = Vec::new();
        while let Ok((tenant_id, msg)) = rx.try_recv() {
            reclaimed.push((tenant_id, msg));
        }
        drop(rx_guard);

        for (tenant_id, msg) in reclaimed {
            let still_live = self.registry.resolve(&tenant_id).is_ok();
            let keep = msg.healthy
                && still_live
                && !msg.slot.is_idle_expired(self.config.connection_ttl);

            if keep {
                let mut idle = self.idle.lock().await;
                idle.entry(tenant_id).or_default().push_back(msg.slot);
            } else {
                let _ = self.client.close(&msg.slot.handle).await;
                self.global_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    /// Periodic idle-TTL sweep. Intended to be driven by a background
    /// `tokio::time::interval` loop started at process wiring time.
    pub async fn sweep_idle(&self) {
        self.process_returns().await;
        let mut idle = self.idle.lock().await;
        for queue in idle.values_mut() {
            let before = queue.len();
            queue.retain(|slot| !slot.is_idle_expired(self.config.connection_ttl));
            let removed = before - queue.len();
            if removed > 0 {
                self.global_count.fetch_sub(removed, Ordering::Relaxed);
            }
        }
    }

    /// Close and drop all connections for a tenant. Used on `Registry::remove`.
    pub async fn clear(&self, tenant_id: &str) {
        self.process_returns().await;
        let mut idle = self.idle.lock().await;
        if let Some(queue) = idle.remove(tenant_id) {
            for slot in queue {
                let _ = self.client.close(&slot.handle).await;
                self.global_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
        self.tenant_states.remove(tenant_id);
    }

    pub async fn stats(&self) -> PoolStats {
        self.process_returns().await;
        let (hits, misses, evictions, rate_limited) = self.stats.snapshot();
        let idle_total: usize = self.idle.lock().await.values().map(|q| q.len()).sum();
        let total = self.global_count.load(Ordering::Relaxed);
        PoolStats {
            pools: self.tenant_states.len() as u64,
            total: total as u64,
            active: total.saturating_sub(idle_total) as u64,
            idle: idle_total as u64,
            hits,
            misses,
            evictions,
            rate_limited,
        }
    }

    pub fn rate_limit_snapshot(&self, tenant_id: &str) -> Option<(f64, f64)> {
        self.rate_limiter.snapshot(tenant_id)
    }

    /// Start the background idle-sweep task. Returns a handle callers can
    /// abort at shutdown.
    pub fn start_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.sweep_idle().await;
            }
        })
    }
}
