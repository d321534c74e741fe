//! Bounded retry with interruptible backoff.
//!
//! Window acquisition, detection and validation all share this one policy
//! object instead of hand-rolled loops.

use std::time::Duration;

use crate::automation::interrupt::InterruptMonitor;
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_step: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff_step: Duration::ZERO,
        }
    }

    /// Grows the wait by `step` after every failed attempt.
    pub fn with_backoff(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the `attempt`th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay + self.backoff_step * attempt.saturating_sub(1)
    }

    /// Runs `op` until it succeeds or fails with a non-retryable error.
    pub fn run<T, F>(
        &self,
        what: &str,
        monitor: &InterruptMonitor,
        quantum: Duration,
        op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
    {
        self.run_while(what, monitor, quantum, EngineError::is_retryable, op)
    }

    /// Like [`RetryPolicy::run`] with a custom notion of "worth retrying".
    /// `Interrupted` is never retried.
    pub fn run_while<T, F, P>(
        &self,
        what: &str,
        monitor: &InterruptMonitor,
        quantum: Duration,
        retryable: P,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
        P: Fn(&EngineError) -> bool,
    {
        let mut attempt = 1;
        loop {
            monitor.checkpoint()?;
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(EngineError::Interrupted) => return Err(EngineError::Interrupted),
                Err(e) => e,
            };
            if !retryable(&err) || attempt >= self.max_attempts {
                if attempt > 1 {
                    crate::log(&format!(
                        "{}: giving up after {} attempts ({})",
                        what, attempt, err
                    ));
                }
                return Err(err);
            }
            let wait = self.delay_after(attempt);
            crate::log(&format!(
                "{}: attempt {}/{} failed ({}), retrying in {}ms",
                what,
                attempt,
                self.max_attempts,
                err,
                wait.as_millis()
            ));
            monitor.sleep(wait, quantum)?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const QUANTUM: Duration = Duration::from_millis(5);

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        let monitor = InterruptMonitor::new();
        let mut calls = 0;

        let result = policy.run("read", &monitor, QUANTUM, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(EngineError::Capture("blank".into()))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let monitor = InterruptMonitor::new();
        let mut calls = 0;

        let result: Result<(), _> = policy.run("read", &monitor, QUANTUM, |_| {
            calls += 1;
            Err(EngineError::DetectionFailed("nothing".into()))
        });

        assert_eq!(result, Err(EngineError::DetectionFailed("nothing".into())));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let monitor = InterruptMonitor::new();
        let mut calls = 0;

        let result: Result<(), _> = policy.run("read", &monitor, QUANTUM, |_| {
            calls += 1;
            Err(EngineError::Recognizer("frame too small".into()))
        });

        assert!(matches!(result, Err(EngineError::Recognizer(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_stop_during_backoff_is_not_swallowed() {
        let policy = RetryPolicy::new(10, Duration::from_secs(5));
        let monitor = InterruptMonitor::new();
        let remote = monitor.clone();

        let start = Instant::now();
        let result: Result<(), _> = policy.run("read", &monitor, QUANTUM, |_| {
            remote.request_stop();
            Err(EngineError::Capture("blank".into()))
        });

        assert_eq!(result, Err(EngineError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_custom_predicate_and_progressive_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200))
            .with_backoff(Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));

        let quick = RetryPolicy::new(2, Duration::ZERO);
        let monitor = InterruptMonitor::new();
        let mut calls = 0;
        let result: Result<(), _> = quick.run_while(
            "find window",
            &monitor,
            QUANTUM,
            |e| matches!(e, EngineError::WindowNotFound(_)),
            |_| {
                calls += 1;
                Err(EngineError::WindowNotFound("tlopo".into()))
            },
        );
        assert!(matches!(result, Err(EngineError::WindowNotFound(_))));
        assert_eq!(calls, 2);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
