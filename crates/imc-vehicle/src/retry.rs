//! Bounded retry with exponential backoff and jitter.
//!
//! Reliable server messages are sent through an explicit retry policy: a
//! fixed attempt budget, growing delays, and a giving-up predicate checked
//! before every attempt so a retry abandons itself once the caller's state
//! has moved on (e.g. the vehicle left REQUESTING).

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The giving-up predicate fired; the result is no longer needed.
    #[error("retry abandoned by caller")]
    Abandoned,
    /// Every attempt failed; carries the last error.
    #[error("retries exhausted: {0}")]
    Exhausted(E),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt` (0-based),
    /// doubling from the base and saturating at the maximum, plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        add_jitter(delay, self.jitter_ratio)
    }

    /// Run `op` until it succeeds, the attempt budget runs out, or
    /// `give_up` returns true.
    pub async fn run<T, E, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
        mut give_up: impl FnMut() -> bool,
    ) -> Result<T, RetryError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if give_up() {
                return Err(RetryError::Abandoned);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_err = Some(err);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(RetryError::Exhausted(
            last_err.expect("at least one attempt ran"),
        ))
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) || delay.is_zero() {
        return delay;
    }
    let jitter_ms = (delay.as_millis() as f64) * rand::rng().random_range(0.0..=ratio);
    delay + Duration::from_millis(jitter_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_and_saturates() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for(10), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<&str>> = policy
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient")
                        } else {
                            Ok(n)
                        }
                    }
                },
                || false,
            )
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_the_attempt_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = policy
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
                || false,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted("down"))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn giving_up_short_circuits_without_calling_op() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = policy
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
                || true,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Abandoned)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
