//! Bounded retry with increasing delay for lock-class failures.
//!
//! Deleting, renaming and clearing store files all race other processes that
//! hold the same file. Each of those call sites funnels through [`retry`],
//! passing a classifier that decides which failures are transient.

use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};

/// Upper bound on the delay between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How many times an operation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub attempts: usize,
    /// Delay before the first retry; later delays double up to [`MAX_BACKOFF`].
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: usize, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// A single attempt, no retries.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(MAX_BACKOFF.max(self.base_delay))
            .with_factor(2.0)
            .with_max_times(self.attempts.saturating_sub(1))
    }
}

/// Outcome of a failed [`retry`] run.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last error was retryable but the attempt budget ran out.
    Exhausted { attempts: usize, last: E },
    /// The classifier rejected the error; it was returned without retrying.
    Fatal(E),
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects, or
/// the policy's attempts are used up.
pub fn retry<T, E, F, C>(policy: RetryPolicy, mut op: F, is_retryable: C) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0usize;
    let result = (|| {
        attempt += 1;
        op()
    })
    .retry(policy.backoff())
    .sleep(std::thread::sleep)
    .when(|err| is_retryable(err))
    .notify(|_, delay| {
        tracing::debug!(delay_ms = delay.as_millis() as u64, "retrying after transient failure");
    })
    .call();

    result.map_err(|err| {
        if is_retryable(&err) {
            RetryError::Exhausted {
                attempts: attempt.min(attempts),
                last: err,
            }
        } else {
            RetryError::Fatal(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Failure {
        Busy,
        Broken,
    }

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let value = retry(
            fast(5),
            || {
                calls += 1;
                if calls < 3 { Err(Failure::Busy) } else { Ok(calls) }
            },
            |e| *e == Failure::Busy,
        )
        .expect("third attempt succeeds");
        assert_eq!(value, 3);
    }

    #[test]
    fn stops_at_attempt_bound() {
        let mut calls = 0;
        let err = retry(
            fast(4),
            || -> Result<(), Failure> {
                calls += 1;
                Err(Failure::Busy)
            },
            |e| *e == Failure::Busy,
        )
        .expect_err("never succeeds");
        assert_eq!(calls, 4);
        match err {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last, Failure::Busy);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn non_retryable_error_returns_immediately() {
        let mut calls = 0;
        let err = retry(
            fast(10),
            || -> Result<(), Failure> {
                calls += 1;
                Err(Failure::Broken)
            },
            |e| *e == Failure::Busy,
        )
        .expect_err("fails");
        assert_eq!(calls, 1);
        assert!(matches!(err, RetryError::Fatal(Failure::Broken)));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _ = retry(
            RetryPolicy::new(0, Duration::ZERO),
            || -> Result<(), Failure> {
                calls += 1;
                Err(Failure::Busy)
            },
            |_| true,
        );
        assert_eq!(calls, 1);
    }
}
