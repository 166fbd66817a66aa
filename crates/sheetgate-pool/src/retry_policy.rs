//! Shared retry/backoff policy for classifying remote `ClientError`s.
//!
//! Both the Connection Pool (on `open()` failures) and the Batch
//! Coordinator (on flush-time remote calls) talk to the same
//! `DocumentClient`, so they consult this one policy object rather than
//! each inventing its own mapping from `ClientError` onto retry behavior.
//! Transient and auth failures are retried once; a rate limit defers the
//! caller; a fatal failure is never retried.

use std::time::Duration;

use rand::Rng;
use sheetgate_core::document_client::ClientError;

pub const DEFAULT_BASE_BACKOFF_MS: u64 = 200;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// What kind of failure a `ClientError` represents, independent of which
/// `SheetGateError` a caller ultimately surfaces it as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorClass {
    /// Worth one immediate retry; a second failure is terminal.
    Transient,
    /// Worth one retry with refreshed credentials.
    Auth,
    /// The caller should defer the whole operation, not just this call.
    RateLimited(Duration),
    /// Never retried.
    Fatal,
}

/// Exponential backoff with jitter, shared by the Pool's reconnect path and
/// the Coordinator's flush-retry path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            base_backoff,
            max_backoff,
        }
    }

    /// Classify a single `ClientError`. Does not retry by itself; callers
    /// use this to decide whether to retry, defer, or fail.
    pub fn classify(&self, err: &ClientError) -> ErrorClass {
        match err {
            ClientError::Transient(_) => ErrorClass::Transient,
            ClientError::Auth(_) => ErrorClass::Auth,
            ClientError::RateLimited { retry_after_secs } => {
                ErrorClass::RateLimited(Duration::from_secs_f64(retry_after_secs.max(0.0)))
            }
            ClientError::Fatal(_) => ErrorClass::Fatal,
        }
    }

    /// Backoff duration for the `attempt`th (0-based) deferred retry,
    /// doubling the base delay and capping it, with full jitter so
    /// concurrent tenants hitting the same limit don't retry in lockstep.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_backoff.as_millis() as u64;
        let cap_ms = self.max_backoff.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16)).min(cap_ms);
        let jittered_ms = rand::thread_rng().gen_range(0..=exp_ms.max(1));
        Duration::from_millis(jittered_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_client_error_variant() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify(&ClientError::Transient("x".into())),
            ErrorClass::Transient
        );
        assert_eq!(policy.classify(&ClientError::Auth("x".into())), ErrorClass::Auth);
        assert_eq!(policy.classify(&ClientError::Fatal("x".into())), ErrorClass::Fatal);
        match policy.classify(&ClientError::RateLimited { retry_after_secs: 2.5 }) {
            ErrorClass::RateLimited(d) => assert_eq!(d, Duration::from_secs_f64(2.5)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn backoff_grows_but_stays_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_millis(1000));
        for attempt in 0..10 {
            assert!(policy.backoff_for_attempt(attempt) <= Duration::from_millis(1000));
        }
    }
}
