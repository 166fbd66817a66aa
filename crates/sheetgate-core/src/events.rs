//! Write-event bus.
//!
//! The Batch Coordinator emits one of these events after a successful
//! flush; the Cache consumes them through the invalidation rule table.
//! Dispatch is synchronous and awaited by the emitter -- invalidation MUST
//! complete before the write's future resolves, which is what guarantees
//! read-your-writes.

use async_trait::async_trait;

/// The trigger names from the invalidation rule table (spec section 4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteEvent {
    SheetWrite { tenant_id: String, sheet_title: String },
    RowAdd { tenant_id: String, sheet_title: String },
    RowUpdate {
        tenant_id: String,
        sheet_title: String,
        row_id: String,
    },
    RowDelete { tenant_id: String, sheet_title: String },
    ConfigUpdate { tenant_id: String },
    TenantRemove { tenant_id: String },
}

impl WriteEvent {
    pub fn tenant_id(&self) -> &str {
        match self {
            WriteEvent::SheetWrite { tenant_id, .. }
            | WriteEvent::RowAdd { tenant_id, .. }
            | WriteEvent::RowUpdate { tenant_id, .. }
            | WriteEvent::RowDelete { tenant_id, .. }
            | WriteEvent::ConfigUpdate { tenant_id }
            | WriteEvent::TenantRemove { tenant_id } => tenant_id,
        }
    }
}

/// Something that reacts to write events -- in practice, the Cache.
///
/// `on_event` is async so an observer can do I/O-free bookkeeping, but it is
/// awaited synchronously by the bus, never spawned off, so emitters can
/// rely on "by the time emit() returns, invalidation has happened".
#[async_trait]
pub trait WriteObserver: Send + Sync {
    async fn on_event(&self, event: &WriteEvent);
}

/// A minimal synchronous event bus. Observers are registered once at
/// process wiring time (see the Design Notes' "no package-level mutable
/// state" guidance) and invoked in registration order.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<std::sync::Arc<dyn WriteObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: std::sync::Arc<dyn WriteObserver>) {
        self.observers.push(observer);
    }

    /// Dispatch an event to every observer, awaiting each in turn.
    pub async fn emit(&self, event: WriteEvent) {
        for observer in &self.observers {
            observer.on_event(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingObserver(AtomicUsize);

    #[async_trait]
    impl WriteObserver for CountingObserver {
        async fn on_event(&self, _event: &WriteEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn emit_awaits_every_observer_before_returning() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let mut bus = EventBus::new();
        bus.register(observer.clone());

        bus.emit(WriteEvent::ConfigUpdate {
            tenant_id: "t1".into(),
        })
        .await;

        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }
}
