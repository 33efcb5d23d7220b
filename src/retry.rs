use std::thread;
use std::time::Duration;

use serde::Deserialize;

/// Errors that may succeed when the same operation is simply run again.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 20,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts.max(1) => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure; retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fmt;
    use std::time::Duration;

    use super::{RetryPolicy, Retryable};

    #[derive(Debug)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky transient={}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(3), Duration::from_millis(80));
        assert_eq!(policy.backoff(10), Duration::from_millis(500));
        assert_eq!(policy.backoff(200), Duration::from_millis(500));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let calls = Cell::new(0);
        let result: Result<u32, Flaky> = fast().run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Flaky(true))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.expect("third attempt should succeed"), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_failures_and_exhausted_budgets_stop() {
        let calls = Cell::new(0);
        let result: Result<(), Flaky> = fast().run("test", || {
            calls.set(calls.get() + 1);
            Err(Flaky(false))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);

        calls.set(0);
        let result: Result<(), Flaky> = fast().run("test", || {
            calls.set(calls.get() + 1);
            Err(Flaky(true))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let _ = RetryPolicy::none().run("test", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Flaky(true))
        });
        assert_eq!(calls.get(), 1);
    }
}
