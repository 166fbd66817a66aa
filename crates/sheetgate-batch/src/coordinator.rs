//! Batch Coordinator.
//!
//! Coalesces concurrent write operations to the same `(tenant, sheetTitle)`
//! into one remote round-trip, respecting the Pool's rate budget while
//! preserving per-queue operation order.

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sheetgate_core::document_client::ClientResult;
use sheetgate_core::{DocumentClient, EventBus, SheetGateError, WriteEvent};
use sheetgate_pool::{ConnectionPool, ErrorClass, RetryPolicy};
use tokio::sync::{oneshot, Mutex};

use crate::config::BatchConfig;
use crate::operation::{OpOutcome, OpResult, Operation, QueuedOp};
use crate::queue::{QueueInner, QueueState};
use crate::stats::{BatchStats, BatchStatsAtomic};

type QueueKey = (String, String);

/// The Batch Coordinator.
pub struct BatchCoordinator<C: DocumentClient + 'static> {
    pool: Arc<ConnectionPool<C>>,
    client: Arc<C>,
    config: BatchConfig,
    event_bus: Arc<EventBus>,
    queues: DashMap<QueueKey, Arc<Mutex<QueueInner>>>,
    stats: BatchStatsAtomic,
}

impl<C: DocumentClient + 'static> BatchCoordinator<C> {
    pub fn new(
        pool: Arc<ConnectionPool<C>>,
        client: Arc<C>,
        config: BatchConfig,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            client,
            config,
            event_bus,
            queues: DashMap::new(),
            stats: BatchStatsAtomic::default(),
        })
    }

    fn queue_for(&self, tenant_id: &str, sheet_title: &str) -> Arc<Mutex<QueueInner>> {
        self.queues
            .entry((tenant_id.to_string(), sheet_title.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(QueueInner::default())))
            .clone()
    }

    /// Enqueue an operation; the returned receiver completes with the op's
    /// result once the containing flush finishes.
    pub async fn enqueue(
        self: &Arc<Self>,
        tenant_id: &str,
        sheet_title: &str,
        op: Operation,
    ) -> oneshot::Receiver<OpOutcome> {
        let (result_tx, result_rx) = oneshot::channel();
        let queue = self.queue_for(tenant_id, sheet_title);

        let (should_flush_now, generation) = {
            let mut inner = queue.lock().await;
            inner.ops.push(QueuedOp { op, result_tx });
            self.stats.record_enqueued();

            if inner.first_enqueued_at.is_none() {
                inner.first_enqueued_at = Some(std::time::Instant::now());
                inner.generation += 1;
                inner.state = QueueState::Buffering;
            }

            let size_trigger = inner.ops.len() >= self.config.max_batch_size;
            (size_trigger, inner.generation)
        };

        if should_flush_now {
            self.spawn_flush_attempt(tenant_id.to_string(), sheet_title.to_string(), generation, Duration::ZERO);
        } else {
            self.spawn_flush_attempt(
                tenant_id.to_string(),
                sheet_title.to_string(),
                generation,
                self.config.batch_delay,
            );
            // Hard ceiling failsafe: if this cycle is still pending at
            // max_batch_wait, force an attempt regardless of the delay timer.
            self.spawn_flush_attempt(
                tenant_id.to_string(),
                sheet_title.to_string(),
                generation,
                self.config.max_batch_wait,
            );
        }

        result_rx
    }

    fn spawn_flush_attempt(
        self: &Arc<Self>,
        tenant_id: String,
        sheet_title: String,
        generation: u64,
        after: Duration,
    ) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if !after.is_zero() {
                tokio::time::sleep(after).await;
            }
            coordinator.try_flush(&tenant_id, &sheet_title, generation).await;
        });
    }

    /// Attempt a flush if the queue's generation still matches (no other
    /// task already flushed this cycle) and it is currently eligible.
    async fn try_flush(self: &Arc<Self>, tenant_id: &str, sheet_title: &str, generation: u64) {
        let queue = self.queue_for(tenant_id, sheet_title);

        let batch = {
            let mut inner = queue.lock().await;
            if inner.generation != generation || inner.state == QueueState::Flushing || inner.ops.is_empty() {
                return;
            }
            inner.state = QueueState::Flushing;
            std::mem::take(&mut inner.ops)
        };

        match self.execute_flush(tenant_id, sheet_title, batch).await {
            FlushOutcome::Done(count) => {
                let mut inner = queue.lock().await;
                inner.state = QueueState::Idle;
                inner.first_enqueued_at = None;
                inner.backoff = Duration::from_millis(0);
                self.stats.record_flush(count);
            }
            FlushOutcome::RateLimited(retry_after) => {
                let (next_generation, backoff) = {
                    let mut inner = queue.lock().await;
                    inner.state = QueueState::Buffering;
                    inner.backoff = (inner.backoff * 2 + retry_after).min(self.config.max_backoff);
                    (inner.generation, inner.backoff)
                };
                self.spawn_flush_attempt(
                    tenant_id.to_string(),
                    sheet_title.to_string(),
                    next_generation,
                    backoff,
                );
            }
            FlushOutcome::Fatal => {
                let mut inner = queue.lock().await;
                inner.state = QueueState::Idle;
                inner.first_enqueued_at = None;
                inner.backoff = Duration::from_millis(0);
                self.stats.record_error();
            }
        }
    }

    /// Execute one drained batch. Ops whose sender is consumed here are
    /// resolved exactly once; on `RateLimited`, nothing is resolved and the
    /// ops are pushed back onto the live queue for a later attempt.
    async fn execute_flush(
        &self,
        tenant_id: &str,
        sheet_title: &str,
        batch: Vec<QueuedOp>,
    ) -> FlushOutcome {
        let conn = match self.pool.acquire(tenant_id).await {
            Ok(conn) => conn,
            Err(SheetGateError::RateLimited { retry_after, .. }) => {
                self.requeue(tenant_id, sheet_title, batch).await;
                return FlushOutcome::RateLimited(retry_after);
            }
            Err(other) => {
                self.fail_all(batch, other);
                return FlushOutcome::Fatal;
            }
        };

        let count = batch.len();
        let headers = batch.iter().find_map(|q| match &q.op {
            Operation::SetHeader { headers } => Some(headers.clone()),
            _ => None,
        });
        let policy = self.pool.retry_policy();

        let sheet = match remote_call(policy, tenant_id, || {
            self.client
                .ensure_sheet(conn.handle(), sheet_title, headers.as_deref().unwrap_or(&[]))
        })
        .await
        {
            Ok(sheet) => sheet,
            Err(RemoteFailure::RateLimited(retry_after)) => {
                self.requeue(tenant_id, sheet_title, batch).await;
                return FlushOutcome::RateLimited(retry_after);
            }
            Err(RemoteFailure::Err(e)) => {
                self.fail_all(batch, e);
                return FlushOutcome::Fatal;
            }
        };

        let mut header_ops = Vec::new();
        let mut insert_rows = Vec::new();
        let mut insert_ops = Vec::new();
        let mut update_ops = Vec::new();
        let mut delete_ops: Vec<QueuedOp> = Vec::new();

        for queued in batch {
            match &queued.op {
                Operation::SetHeader { .. } => header_ops.push(queued),
                Operation::AddRow { row } => {
                    insert_rows.push(row.clone());
                    insert_ops.push(queued);
                }
                Operation::AddRows { rows } => {
                    insert_rows.extend(rows.clone());
                    insert_ops.push(queued);
                }
                Operation::UpdateRow { .. } => update_ops.push(queued),
                Operation::DeleteRow { .. } => delete_ops.push(queued),
            }
        }

        let had_header = !header_ops.is_empty();
        let had_insert = !insert_rows.is_empty();
        let mut update_row_ids: Vec<String> = update_ops
            .iter()
            .filter_map(|q| match &q.op {
                Operation::UpdateRow { row_id, .. } => Some(row_id.clone()),
                _ => None,
            })
            .collect();
        update_row_ids.sort();
        update_row_ids.dedup();
        let had_delete = !delete_ops.is_empty();

        for queued in header_ops {
            let _ = queued.result_tx.send(Ok(OpResult::HeaderSet));
        }

        if !insert_rows.is_empty() {
            match remote_call(policy, tenant_id, || self.client.add_rows(&sheet, insert_rows.clone())).await {
                Ok(n) => {
                    let outcome: OpOutcome = Ok(OpResult::RowsAdded(n));
                    for queued in insert_ops {
                        let _ = queued.result_tx.send(clone_outcome(&outcome));
                    }
                }
                Err(RemoteFailure::RateLimited(retry_after)) => {
                    let mut remaining = insert_ops;
                    remaining.extend(update_ops);
                    remaining.extend(delete_ops);
                    self.requeue(tenant_id, sheet_title, remaining).await;
                    return FlushOutcome::RateLimited(retry_after);
                }
                Err(RemoteFailure::Err(e)) => {
                    let outcome: OpOutcome = Err(e);
                    for queued in insert_ops {
                        let _ = queued.result_tx.send(clone_outcome(&outcome));
                    }
                }
            }
        }

        let mut update_iter = update_ops.into_iter();
        while let Some(queued) = update_iter.next() {
            let (row_id, fields) = match &queued.op {
                Operation::UpdateRow { row_id, fields } => (row_id.clone(), fields.clone()),
                _ => continue,
            };
            match remote_call(policy, tenant_id, || self.client.update_row(&sheet, &row_id, fields.clone())).await {
                Ok(_) => {
                    let _ = queued.result_tx.send(Ok(OpResult::Updated));
                }
                Err(RemoteFailure::RateLimited(retry_after)) => {
                    let mut remaining = vec![queued];
                    remaining.extend(update_iter);
                    remaining.extend(delete_ops);
                    self.requeue(tenant_id, sheet_title, remaining).await;
                    return FlushOutcome::RateLimited(retry_after);
                }
                Err(RemoteFailure::Err(e)) => {
                    let _ = queued.result_tx.send(Err(e));
                }
            }
        }

        // Deduplicate deletes by row id; everyone sharing that id gets the
        // one call's outcome.
        let mut seen_rows = std::collections::HashSet::new();
        let mut ordered_row_ids = Vec::new();
        for queued in &delete_ops {
            if let Operation::DeleteRow { row_id } = &queued.op {
                if seen_rows.insert(row_id.clone()) {
                    ordered_row_ids.push(row_id.clone());
                }
            }
        }

        let mut outcome_by_row: StdHashMap<String, OpOutcome> = StdHashMap::new();
        let mut row_id_iter = ordered_row_ids.into_iter();
        while let Some(row_id) = row_id_iter.next() {
            match remote_call(policy, tenant_id, || self.client.delete_row(&sheet, &row_id)).await {
                Ok(_) => {
                    outcome_by_row.insert(row_id, Ok(OpResult::Deleted));
                }
                Err(RemoteFailure::RateLimited(retry_after)) => {
                    let still_pending: std::collections::HashSet<String> =
                        std::iter::once(row_id).chain(row_id_iter).collect();
                    let mut remaining = Vec::new();
                    for queued in delete_ops {
                        let pending = matches!(&queued.op, Operation::DeleteRow { row_id } if still_pending.contains(row_id));
                        if pending {
                            remaining.push(queued);
                        } else if let Operation::DeleteRow { row_id } = &queued.op {
                            if let Some(outcome) = outcome_by_row.get(row_id) {
                                let _ = queued.result_tx.send(clone_outcome(outcome));
                            }
                        }
                    }
                    self.requeue(tenant_id, sheet_title, remaining).await;
                    return FlushOutcome::RateLimited(retry_after);
                }
                Err(RemoteFailure::Err(e)) => {
                    outcome_by_row.insert(row_id, Err(e));
                }
            }
        }
        for queued in delete_ops {
            if let Operation::DeleteRow { row_id } = &queued.op {
                if let Some(outcome) = outcome_by_row.get(row_id) {
                    let _ = queued.result_tx.send(clone_outcome(outcome));
                }
            }
        }

        drop(conn);

        // Invalidation must be observable before any write's future
        // resolves; per-op resolutions above already fired, but the
        // flush's own completion (and therefore `flush_all`/next-read
        // ordering) is gated on these emits finishing first. Only the
        // op kinds actually present in this batch get an event, so the
        // rule table in `sheetgate-cache` only fires for tags a write
        // could actually have touched.
        if had_header {
            self.event_bus
                .emit(WriteEvent::SheetWrite {
                    tenant_id: tenant_id.to_string(),
                    sheet_title: sheet_title.to_string(),
                })
                .await;
        }
        if had_insert {
            self.event_bus
                .emit(WriteEvent::RowAdd {
                    tenant_id: tenant_id.to_string(),
                    sheet_title: sheet_title.to_string(),
                })
                .await;
        }
        for row_id in update_row_ids {
            self.event_bus
                .emit(WriteEvent::RowUpdate {
                    tenant_id: tenant_id.to_string(),
                    sheet_title: sheet_title.to_string(),
                    row_id,
                })
                .await;
        }
        if had_delete {
            self.event_bus
                .emit(WriteEvent::RowDelete {
                    tenant_id: tenant_id.to_string(),
                    sheet_title: sheet_title.to_string(),
                })
                .await;
        }

        FlushOutcome::Done(count)
    }

    async fn requeue(&self, tenant_id: &str, sheet_title: &str, mut batch: Vec<QueuedOp>) {
        let queue = self.queue_for(tenant_id, sheet_title);
        let mut inner = queue.lock().await;
        batch.append(&mut inner.ops);
        inner.ops = batch;
    }

    fn fail_all(&self, batch: Vec<QueuedOp>, err: SheetGateError) {
        for queued in batch {
            let _ = queued.result_tx.send(Err(err.clone()));
        }
    }

    /// Force-flush every queue (or only a tenant's queues) regardless of
    /// timers. Used by the admin `POST /admin/batch/flush` endpoint.
    pub async fn flush_all(self: &Arc<Self>, tenant_id: Option<&str>) {
        let keys: Vec<QueueKey> = self
            .queues
            .iter()
            .filter(|e| tenant_id.map(|t| e.key().0 == t).unwrap_or(true))
            .map(|e| e.key().clone())
            .collect();

        for (t, s) in keys {
            let generation = {
                let queue = self.queue_for(&t, &s);
                let inner = queue.lock().await;
                inner.generation
            };
            self.try_flush(&t, &s, generation).await;
        }
    }

    pub fn stats(&self) -> BatchStats {
        self.stats.snapshot()
    }
}

fn clone_outcome(outcome: &OpOutcome) -> OpOutcome {
    match outcome {
        Ok(r) => Ok(r.clone()),
        Err(e) => Err(e.clone()),
    }
}

enum FlushOutcome {
    Done(usize),
    RateLimited(Duration),
    Fatal,
}

/// Outcome of [`remote_call`]: either the call's result, a signal to defer
/// the whole flush, or a terminal `SheetGateError` to resolve ops with.
enum RemoteFailure {
    RateLimited(Duration),
    Err(SheetGateError),
}

/// Call a remote `DocumentClient` method through the shared retry policy.
/// Transient and auth failures get one retry; a persisting auth failure
/// becomes `AuthFailure`, anything else persisting (or a fatal failure on
/// the first attempt) becomes `Conflict`; a rate limit at either attempt
/// short-circuits straight to `RemoteFailure::RateLimited`.
async fn remote_call<T, F, Fut>(policy: &RetryPolicy, tenant_id: &str, f: F) -> Result<T, RemoteFailure>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let first_err = match f().await {
        Ok(v) => return Ok(v),
        Err(err) => err,
    };

    match policy.classify(&first_err) {
        ErrorClass::RateLimited(retry_after) => Err(RemoteFailure::RateLimited(retry_after)),
        ErrorClass::Fatal => Err(RemoteFailure::Err(SheetGateError::Conflict(first_err.to_string()))),
        ErrorClass::Transient | ErrorClass::Auth => match f().await {
            Ok(v) => Ok(v),
            Err(second_err) => match policy.classify(&second_err) {
                ErrorClass::RateLimited(retry_after) => Err(RemoteFailure::RateLimited(retry_after)),
                ErrorClass::Auth => Err(RemoteFailure::Err(SheetGateError::AuthFailure {
                    tenant_id: tenant_id.to_string(),
                    message: second_err.to_string(),
                })),
                ErrorClass::Transient | ErrorClass::Fatal => {
                    Err(RemoteFailure::Err(SheetGateError::Conflict(second_err.to_string())))
                }
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetgate_core::document_client::fake::FakeDocumentClient;
    use sheetgate_core::{Row, TenantAttrs, TenantRegistry};
    use sheetgate_pool::{PoolConfig, RateConfig, RateLimiter};
    use std::time::Duration as StdDuration;

    fn registry_with(tenant_id: &str, sheet_ref: &str) -> TenantRegistry {
        let registry = TenantRegistry::new();
        registry
            .add_or_update(
                tenant_id,
                TenantAttrs {
                    sheet_ref: Some(sheet_ref.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        registry
    }

    fn coordinator_with(
        registry: TenantRegistry,
        batch_config: BatchConfig,
    ) -> (Arc<BatchCoordinator<FakeDocumentClient>>, Arc<FakeDocumentClient>) {
        let client = Arc::new(FakeDocumentClient::new());
        let rate_limiter = RateLimiter::new(RateConfig {
            per_tenant_max_requests: 1000.0,
            per_tenant_window: StdDuration::from_millis(1000),
        });
        let pool = ConnectionPool::new(registry, client.clone(), PoolConfig::default(), rate_limiter);
        let event_bus = Arc::new(EventBus::new());
        let coordinator = BatchCoordinator::new(pool, client.clone(), batch_config, event_bus);
        (coordinator, client)
    }

    #[tokio::test]
    async fn coalesces_concurrent_add_rows_into_one_call() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(30),
            max_batch_size: 100,
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);

        let mut receivers = Vec::new();
        for i in 0..12 {
            let row = Row {
                id: String::new(),
                fields: std::collections::HashMap::from([("n".to_string(), i.to_string())]),
            };
            let rx = coordinator.enqueue("t1", "METRICS", Operation::AddRow { row }).await;
            receivers.push(rx);
        }

        for rx in receivers {
            let outcome = rx.await.unwrap();
            assert!(matches!(outcome, Ok(OpResult::RowsAdded(12))));
        }

        assert_eq!(client.call_count_for("METRICS"), 1);
    }

    #[tokio::test]
    async fn size_trigger_flushes_without_waiting_for_delay() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_secs(10),
            max_batch_size: 3,
            max_batch_wait: StdDuration::from_secs(10),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let rx = coordinator
                .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
                .await;
            receivers.push(rx);
        }

        for rx in receivers {
            rx.await.unwrap().unwrap();
        }
        assert_eq!(client.call_count_for("S"), 1);
    }

    #[tokio::test]
    async fn deletes_dedupe_by_row_id_last_wins() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(20),
            max_batch_size: 100,
            max_batch_wait: StdDuration::from_millis(100),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);

        let sheet = client
            .ensure_sheet(&client.open("sheet-1").await.unwrap(), "S", &[])
            .await
            .unwrap();
        client
            .add_rows(&sheet, vec![Row { id: "r1".into(), fields: Default::default() }])
            .await
            .unwrap();

        let rx1 = coordinator
            .enqueue("t1", "S", Operation::DeleteRow { row_id: "r1".into() })
            .await;
        let rx2 = coordinator
            .enqueue("t1", "S", Operation::DeleteRow { row_id: "r1".into() })
            .await;

        assert!(matches!(rx1.await.unwrap(), Ok(OpResult::Deleted)));
        assert!(matches!(rx2.await.unwrap(), Ok(OpResult::Deleted)));
    }

    #[tokio::test]
    async fn flush_all_forces_pending_ops_through() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_secs(30),
            max_batch_wait: StdDuration::from_secs(30),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);

        let rx = coordinator
            .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
            .await;

        coordinator.flush_all(Some("t1")).await;
        rx.await.unwrap().unwrap();
        assert_eq!(client.call_count_for("S"), 1);
    }

    #[tokio::test]
    async fn transient_add_rows_failure_is_retried_and_succeeds() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);
        client.queue_add_rows_fault(sheetgate_core::document_client::ClientError::Transient(
            "blip".into(),
        ));

        let rx = coordinator
            .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
            .await;

        assert!(matches!(rx.await.unwrap(), Ok(OpResult::RowsAdded(1))));
        assert_eq!(client.call_count_for("S"), 1);
    }

    #[tokio::test]
    async fn remote_rate_limit_during_add_rows_requeues_instead_of_failing() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            max_backoff: StdDuration::from_millis(50),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);
        client.queue_add_rows_fault(sheetgate_core::document_client::ClientError::RateLimited {
            retry_after_secs: 0.01,
        });

        let rx = coordinator
            .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
            .await;

        assert!(matches!(rx.await.unwrap(), Ok(OpResult::RowsAdded(1))));
    }

    #[tokio::test]
    async fn fatal_ensure_sheet_failure_fails_the_batch_as_conflict() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);
        client.queue_ensure_sheet_fault(sheetgate_core::document_client::ClientError::Fatal(
            "sheet deleted".into(),
        ));

        let rx = coordinator
            .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
            .await;

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn auth_failure_that_persists_through_retry_surfaces_as_auth_failure() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let (coordinator, client) = coordinator_with(registry, config);

        let sheet = client
            .ensure_sheet(&client.open("sheet-1").await.unwrap(), "S", &[])
            .await
            .unwrap();
        client
            .add_rows(&sheet, vec![Row { id: "r1".into(), fields: Default::default() }])
            .await
            .unwrap();

        client.queue_update_row_fault(sheetgate_core::document_client::ClientError::Auth("expired".into()));
        client.queue_update_row_fault(sheetgate_core::document_client::ClientError::Auth("expired".into()));

        let rx = coordinator
            .enqueue(
                "t1",
                "S",
                Operation::UpdateRow {
                    row_id: "r1".into(),
                    fields: std::collections::HashMap::from([("a".to_string(), "1".to_string())]),
                },
            )
            .await;

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "auth-failure");
    }

    struct RecordingObserver(Mutex<Vec<WriteEvent>>);

    #[async_trait::async_trait]
    impl sheetgate_core::WriteObserver for RecordingObserver {
        async fn on_event(&self, event: &WriteEvent) {
            self.0.lock().await.push(event.clone());
        }
    }

    #[tokio::test]
    async fn add_row_flush_emits_row_add_but_not_sheet_write() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let client = Arc::new(FakeDocumentClient::new());
        let rate_limiter = RateLimiter::new(RateConfig {
            per_tenant_max_requests: 1000.0,
            per_tenant_window: StdDuration::from_millis(1000),
        });
        let pool = ConnectionPool::new(registry, client.clone(), PoolConfig::default(), rate_limiter);
        let mut event_bus = EventBus::new();
        let observer = Arc::new(RecordingObserver(Mutex::new(Vec::new())));
        event_bus.register(observer.clone());
        let coordinator = BatchCoordinator::new(pool, client, config, Arc::new(event_bus));

        let rx = coordinator
            .enqueue("t1", "S", Operation::AddRow { row: Row::default() })
            .await;
        rx.await.unwrap().unwrap();

        let events = observer.0.lock().await;
        assert!(events.iter().any(|e| matches!(e, WriteEvent::RowAdd { .. })));
        assert!(!events.iter().any(|e| matches!(e, WriteEvent::SheetWrite { .. })));
    }

    #[tokio::test]
    async fn update_row_flush_emits_row_update_with_the_row_id() {
        let registry = registry_with("t1", "sheet-1");
        let config = BatchConfig {
            batch_delay: StdDuration::from_millis(10),
            max_batch_wait: StdDuration::from_millis(200),
            ..Default::default()
        };
        let client = Arc::new(FakeDocumentClient::new());
        let sheet = client
            .ensure_sheet(&client.open("sheet-1").await.unwrap(), "S", &[])
            .await
            .unwrap();
        client
            .add_rows(&sheet, vec![Row { id: "r1".into(), fields: Default::default() }])
            .await
            .unwrap();

        let rate_limiter = RateLimiter::new(RateConfig {
            per_tenant_max_requests: 1000.0,
            per_tenant_window: StdDuration::from_millis(1000),
        });
        let pool = ConnectionPool::new(registry, client.clone(), PoolConfig::default(), rate_limiter);
        let mut event_bus = EventBus::new();
        let observer = Arc::new(RecordingObserver(Mutex::new(Vec::new())));
        event_bus.register(observer.clone());
        let coordinator = BatchCoordinator::new(pool, client, config, Arc::new(event_bus));

        let rx = coordinator
            .enqueue(
                "t1",
                "S",
                Operation::UpdateRow {
                    row_id: "r1".into(),
                    fields: std::collections::HashMap::from([("a".to_string(), "1".to_string())]),
                },
            )
            .await;
        rx.await.unwrap().unwrap();

        let events = observer.0.lock().await;
        assert!(events.iter().any(|e| matches!(e, WriteEvent::RowUpdate { row_id, .. } if row_id == "r1")));
    }
}
