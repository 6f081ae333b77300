//! Rate-limit retry.
//!
//! A call answered with 429 sleeps until the server's reset time and is
//! retried exactly once. A second rate limit propagates.

use crate::error::{Error, Result};
use std::time::Duration;

/// Wait used when a 429 carries no reset header.
pub const DEFAULT_WAIT_SECS: u64 = 1;

/// Time source and sleeper, swappable in tests.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Block the calling thread.
    fn sleep(&self, duration: Duration);
}

/// Wall clock with a real blocking sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Callback trait for retry notifications.
pub trait RetryCallback {
    /// Called before sleeping on a rate limit.
    fn on_rate_limited(&self, wait_secs: u64);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_rate_limited(&self, _wait_secs: u64) {}
}

/// Callback that logs the wait at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_rate_limited(&self, wait_secs: u64) {
        log::warn!("rate limited, retrying in {wait_secs}s");
    }
}

/// Seconds to wait for a reset at `reset_millis`.
///
/// `ceil((reset - now + 1000) / 1000)`, never negative.
pub fn sleep_seconds(reset_millis: i64, now_millis: i64) -> u64 {
    let delta = reset_millis.saturating_sub(now_millis).saturating_add(1000);
    if delta <= 0 {
        return 0;
    }
    (delta as u64).div_ceil(1000)
}

/// Run `operation`, retrying once after a rate limit.
///
/// Any other error, and a second rate limit, is returned unchanged.
pub fn with_rate_limit_retry<T, F>(
    clock: &dyn Clock,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    match operation() {
        Err(Error::RateLimited { reset_millis }) => {
            let wait_secs = match reset_millis {
                Some(reset) => sleep_seconds(reset, clock.now_millis()),
                None => DEFAULT_WAIT_SECS,
            };
            if let Some(cb) = callback {
                cb.on_rate_limited(wait_secs);
            }
            clock.sleep(Duration::from_secs(wait_secs));
            operation()
        }
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Frozen clock that records sleeps instead of blocking
    #[derive(Debug, Default)]
    pub(crate) struct FakeClock {
        pub now: i64,
        pub slept: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        pub(crate) fn at(now: i64) -> Self {
            Self {
                now,
                slept: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for FakeClock {
        fn now_millis(&self) -> i64 {
            self.now
        }

        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[test]
    fn test_sleep_seconds_formula() {
        assert_eq!(sleep_seconds(1_000_000 + 2500, 1_000_000), 4);
        assert_eq!(sleep_seconds(1_000_000 + 2000, 1_000_000), 3);
        assert_eq!(sleep_seconds(1_000_000, 1_000_000), 1);
        assert_eq!(sleep_seconds(1_000_000 - 5000, 1_000_000), 0);
    }

    #[test]
    fn test_retry_after_rate_limit() {
        let clock = FakeClock::at(1_700_000_000_000);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_rate_limit_retry(&clock, None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            if attempts_clone.get() == 1 {
                Err(Error::RateLimited {
                    reset_millis: Some(1_700_000_000_000 + 2500),
                })
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 2);
        assert_eq!(*clock.slept.borrow(), vec![Duration::from_secs(4)]);
    }

    #[test]
    fn test_second_rate_limit_propagates() {
        let clock = FakeClock::at(0);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_rate_limit_retry(&clock, Some(&NoCallback), || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::RateLimited { reset_millis: None })
        });

        assert!(matches!(result, Err(Error::RateLimited { .. })));
        assert_eq!(attempts.get(), 2);
        assert_eq!(*clock.slept.borrow(), vec![Duration::from_secs(DEFAULT_WAIT_SECS)]);
    }

    #[test]
    fn test_other_errors_not_retried() {
        let clock = FakeClock::at(0);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_rate_limit_retry(&clock, None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::Conflict {
                message: "exists".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
        assert!(clock.slept.borrow().is_empty());
    }

    #[test]
    fn test_success_first_try() {
        let clock = FakeClock::at(0);
        let result = with_rate_limit_retry(&clock, None, || Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
        assert!(clock.slept.borrow().is_empty());
    }
}
