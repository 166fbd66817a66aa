//! SheetGate error taxonomy.
//!
//! Every component (Registry, Pool, Batch Coordinator, Cache) converts its
//! internal failures into one of these variants before the error crosses a
//! public contract boundary. The taxonomy is what the HTTP surface in
//! `sheetgate-api` maps onto status codes and `{ok:false, code, error,
//! retry_after?}` response bodies.

use std::time::Duration;

/// The canonical SheetGate error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SheetGateError {
    /// No registry entry for the requested tenant.
    #[error("tenant not found: {0}")]
    TenantUnknown(String),

    /// The tenant's rate bucket is empty, or the remote service signalled a
    /// rate limit. Callers should wait `retry_after` before retrying.
    #[error("rate limited for tenant {tenant_id}, retry after {retry_after:?}")]
    RateLimited {
        tenant_id: String,
        retry_after: Duration,
    },

    /// No pool slot became available within the configured timeout.
    #[error("pool exhausted for tenant {tenant_id}, retry after {retry_after:?}")]
    PoolExhausted {
        tenant_id: String,
        retry_after: Duration,
    },

    /// Credential or permission problem talking to the remote document store.
    #[error("auth failure for tenant {tenant_id}: {message}")]
    AuthFailure { tenant_id: String, message: String },

    /// A deadline was exceeded waiting on a remote or internal operation.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A concurrent structural change was detected (e.g. during ensureSheet).
    /// Retried once internally before surfacing.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An enqueued batch operation was cancelled before it was applied.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Internal invariant broken (e.g. negative tokens). Always a bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SheetGateError {
    /// Stable machine-readable code, used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            SheetGateError::TenantUnknown(_) => "tenant-unknown",
            SheetGateError::RateLimited { .. } => "rate-limited",
            SheetGateError::PoolExhausted { .. } => "pool-exhausted",
            SheetGateError::AuthFailure { .. } => "auth-failure",
            SheetGateError::Timeout(_) => "timeout",
            SheetGateError::Conflict(_) => "conflict",
            SheetGateError::Cancelled(_) => "cancelled",
            SheetGateError::InvariantViolation(_) => "invariant-violation",
        }
    }

    /// Seconds the caller should wait before retrying, if applicable.
    pub fn retry_after_secs(&self) -> Option<f64> {
        match self {
            SheetGateError::RateLimited { retry_after, .. }
            | SheetGateError::PoolExhausted { retry_after, .. } => {
                Some(retry_after.as_secs_f64())
            }
            _ => None,
        }
    }
}

/// Result alias used throughout SheetGate's components.
pub type Result<T> = std::result::Result<T, SheetGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_taxonomy() {
        let err = SheetGateError::TenantUnknown("t1".into());
        assert_eq!(err.code(), "tenant-unknown");

        let err = SheetGateError::RateLimited {
            tenant_id: "t1".into(),
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.code(), "rate-limited");
        assert_eq!(err.retry_after_secs(), Some(1.5));
    }

    #[test]
    fn non_retryable_errors_have_no_retry_after() {
        let err = SheetGateError::InvariantViolation("negative tokens".into());
        assert!(err.retry_after_secs().is_none());
    }
}
