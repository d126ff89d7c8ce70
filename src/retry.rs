//! Shared retry-with-backoff for every network hop.
//!
//! Funding transfers, swaps and sells all go through [`with_retry`]. Delays
//! double on each attempt and only transient errors are retried.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::errors::{PoolError, PoolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after failed attempt `attempt` (zero based): base * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sleep schedule handed to tokio-retry; one entry per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..self.max_attempts - 1).map(move |k| policy.delay_for(k))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000))
    }
}

/// Outcome of a retried operation, with how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: PoolResult<T>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PoolResult<T>>,
{
    let attempts = AtomicU32::new(0);
    let action = || {
        let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(label, attempt = n, "attempt");
        op()
    };
    let condition = |e: &PoolError| {
        let retry = e.is_transient();
        warn!(
            label,
            attempt = attempts.load(Ordering::Relaxed),
            retry,
            error = %e,
            "attempt failed"
        );
        retry
    };

    let result = RetryIf::spawn(policy.delays(), action, condition).await;
    Attempted {
        result,
        attempts: attempts.load(Ordering::Relaxed),
    }
}
