//! Bounded retry for rate-limited fetches.
//!
//! Only [`SignalError::RateLimited`] is retried. Every source uses the same
//! bounded policy; there is no unbounded wait.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::error::{SignalError, SignalResult};
use crate::fetcher::SignalTransport;
use crate::obs::emit_retry_scheduled;
use crate::source::{PagingParams, RawPayload, SignalSource};

/// Retry configuration shared by every source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = never retry).
    pub max_attempts: u32,
    /// Wait between attempts when the upstream gives no hint (milliseconds).
    pub delay_ms: u64,
    /// Cap applied to upstream `Retry-After` hints (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts,
            delay_ms,
            max_delay_ms: delay_ms.max(Self::default().max_delay_ms),
        }
    }

    pub fn validate(&self) -> SignalResult<()> {
        if self.max_attempts == 0 {
            return Err(SignalError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before the next attempt, honouring a capped upstream hint.
    pub fn delay_for(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(h) => h.min(Duration::from_millis(self.max_delay_ms)),
            None => Duration::from_millis(self.delay_ms),
        }
    }
}

/// A successful value and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> Retried<T> {
    /// Number of backoff delays waited out.
    pub fn delays(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `op` until it succeeds, fails without rate limiting, or the attempt
/// budget is spent. Backoff waits race `cancel`.
pub async fn retry_rate_limited<T, F, Fut>(
    origin: SignalSource,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut op: F,
) -> SignalResult<Retried<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SignalResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut cancel = cancel.clone();

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(SignalError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SignalError::Cancelled),
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => return Ok(Retried { value, attempts: attempt }),
            Err(SignalError::RateLimited { retry_after, .. }) if attempt < max_attempts => {
                let delay = policy.delay_for(retry_after);
                emit_retry_scheduled(origin, attempt, delay);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SignalError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(SignalError::RateLimited { .. }) => {
                return Err(SignalError::Exhausted {
                    origin,
                    attempts: attempt,
                })
            }
            Err(other) => return Err(other),
        }
    }

    Err(SignalError::Exhausted {
        origin,
        attempts: max_attempts,
    })
}

/// Fetch `term` from `source` with the bounded rate-limit retry.
pub async fn fetch_with_retry(
    transport: &dyn SignalTransport,
    source: SignalSource,
    term: &str,
    params: &PagingParams,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
) -> SignalResult<Retried<RawPayload>> {
    retry_rate_limited(source, policy, cancel, |_| transport.fetch(source, term, params)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn limited() -> SignalError {
        SignalError::RateLimited {
            origin: SignalSource::Twitter,
            retry_after: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_rate_limits() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(10));
        let started = tokio::time::Instant::now();
        let counter = Arc::clone(&calls);
        let result = retry_rate_limited(SignalSource::Twitter, &policy, &CancelSignal::never(), |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(limited())
                } else {
                    Ok("payload")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result.value, "payload");
        assert_eq!(result.attempts, 3);
        assert_eq!(result.delays(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_limited_exhausts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let counter = Arc::clone(&calls);
        let err = retry_rate_limited::<(), _, _>(SignalSource::Twitter, &policy, &CancelSignal::never(), |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(limited()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SignalError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = retry_rate_limited::<(), _, _>(
            SignalSource::Facebook,
            &RetryPolicy::default(),
            &CancelSignal::never(),
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SignalError::Transport {
                        origin: SignalSource::Facebook,
                        reason: "502".to_string(),
                    })
                }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SignalError::Transport { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let (handle, signal) = cancel_pair();
        let policy = RetryPolicy::new(5, Duration::from_secs(300));
        let task = tokio::spawn(async move {
            retry_rate_limited::<(), _, _>(SignalSource::Instagram, &policy, &signal, |_| async {
                Err(limited())
            })
            .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SignalError::Cancelled));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_ms: 1_000,
            max_delay_ms: 30_000,
        };
        assert_eq!(policy.delay_for(None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(10))), Duration::from_secs(10));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(600))), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_attempts_is_invalid() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
