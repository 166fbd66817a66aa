//! Connection slot and the RAII guard handed back to callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sheetgate_core::{DocumentClient, Handle};
use tokio::sync::{mpsc, OwnedSemaphorePermit};

/// A reusable handle to a remote sheet for one tenant.
#[derive(Debug)]
pub struct ConnectionSlot {
    pub tenant_id: String,
    pub handle: Handle,
    pub created_at: Instant,
    pub last_used_at: Instant,
}

impl ConnectionSlot {
    pub fn new(tenant_id: String, handle: Handle) -> Self {
        let now = Instant::now();
        Self {
            tenant_id,
            handle,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub fn is_idle_expired(&self, ttl: Duration) -> bool {
        self.last_used_at.elapsed() > ttl
    }
}

/// Message sent through the return channel when a `PooledConnection` drops.
/// Drop cannot be async, so the slot is handed off here and reconciled
/// (reuse vs. close) by the pool's background return processor.
pub struct ReturnMsg {
    pub slot: ConnectionSlot,
    pub healthy: bool,
}

/// A connection borrowed from the pool.
///
/// Automatically returns the underlying slot to the pool when dropped. The
/// semaphore permit is held for the guard's lifetime and is released back
/// to the tenant's semaphore automatically when the guard drops.
pub struct PooledConnection<C: DocumentClient + ?Sized> {
    slot: Option<ConnectionSlot>,
    return_tx: mpsc::UnboundedSender<(String, ReturnMsg)>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
    _client: Arc<C>,
}

impl<C: DocumentClient + ?Sized> PooledConnection<C> {
    pub(crate) fn new(
        slot: ConnectionSlot,
        return_tx: mpsc::UnboundedSender<(String, ReturnMsg)>,
        permit: OwnedSemaphorePermit,
        client: Arc<C>,
    ) -> Self {
        Self {
            slot: Some(slot),
            return_tx,
            healthy: true,
            _permit: permit,
            _client: client,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.slot.as_ref().expect("connection taken").handle
    }

    /// A connection that errored during use must be discarded rather than
    /// returned to the idle set.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }
}

impl<C: DocumentClient + ?Sized> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.touch();
            let tenant_id = slot.tenant_id.clone();
            let _ = self.return_tx.send((
                tenant_id,
                ReturnMsg {
                    slot,
                    healthy: self.healthy,
                },
            ));
        }
    }
}
