//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed downstream call may be retried
//! - Execute retries with exponential backoff + jitter
//! - Never sleep past the caller's deadline
//!
//! # Design Decisions
//! - Non-idempotent operations are never retried
//! - Only transport-level failures are retryable

use std::future::Future;

use crate::config::RetryConfig;
use crate::context::RequestContext;
use crate::resilience::backoff::calculate_backoff;

/// Upper bound on retries of a single call, whatever the configuration says.
pub const MAX_RETRIES: u32 = 1;

/// Whether an operation may safely run more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// Errors that know whether a retry could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry policy derived from configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: if config.enabled {
                config.max_retries.min(MAX_RETRIES)
            } else {
                0
            },
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op`, retrying retryable failures of idempotent operations.
    pub async fn run<T, E, F, Fut>(
        &self,
        ctx: &RequestContext,
        idempotency: Idempotency,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retries_used = attempt - 1;
            if idempotency == Idempotency::NonIdempotent
                || !err.is_retryable()
                || retries_used >= self.max_retries
                || ctx.is_cancelled()
            {
                return Err(err);
            }

            let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
            if let Some(remaining) = ctx.remaining() {
                if remaining <= delay {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        "Skipping retry: deadline too close"
                    );
                    return Err(err);
                }
            }

            tracing::info!(
                request_id = %ctx.request_id(),
                attempt,
                delay = ?delay,
                error = %err,
                "Retrying downstream call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky({})", self.0)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_retries: 1,
            base_delay_ms: 10,
            max_delay_ms: 10,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_idempotent_transport_failure_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default();
        let result: Result<(), Flaky> = policy()
            .run(&ctx, Idempotency::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_retries_are_capped_at_one() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 10,
        });
        assert_eq!(policy.max_retries(), 1);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default();
        let result: Result<(), Flaky> = policy
            .run(&ctx, Idempotency::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_config_never_retries() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: false,
            max_retries: 1,
            base_delay_ms: 10,
            max_delay_ms: 10,
        });
        assert_eq!(policy.max_retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_attempt_can_succeed() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default();
        let result = policy()
            .run(&ctx, Idempotency::Idempotent, move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Flaky(true))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.ok(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn non_idempotent_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default();
        let _: Result<(), Flaky> = policy()
            .run(&ctx, Idempotency::NonIdempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_when_deadline_too_close() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default().child_with_timeout(Duration::from_millis(5));
        let _: Result<(), Flaky> = policy()
            .run(&ctx, Idempotency::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let ctx = RequestContext::default();
        let _: Result<(), Flaky> = policy()
            .run(&ctx, Idempotency::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(false))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
