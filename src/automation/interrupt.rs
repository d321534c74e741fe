//! Cancellation signal shared between the command path and the worker.
//!
//! Every suspension point in the engine takes an [`InterruptMonitor`] and
//! either calls [`InterruptMonitor::checkpoint`] or sleeps through
//! [`InterruptMonitor::sleep`], which never blocks longer than one polling
//! quantum without looking at the flag again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::EngineError;

/// Lower bound for a sleep slice, so a zero quantum cannot spin.
const MIN_QUANTUM: Duration = Duration::from_millis(1);

type KeyProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Cloneable stop flag with an optional hardware key probe.
#[derive(Clone, Default)]
pub struct InterruptMonitor {
    flag: Arc<AtomicBool>,
    key_probe: Option<KeyProbe>,
}

impl fmt::Debug for InterruptMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptMonitor")
            .field("stop_requested", &self.flag.load(Ordering::SeqCst))
            .field("key_probe", &self.key_probe.is_some())
            .finish()
    }
}

impl InterruptMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key probe (e.g. "is Esc down") consulted on every check.
    /// A positive probe latches the stop flag.
    pub fn with_key_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.key_probe = Some(Arc::new(probe));
        self
    }

    /// Requests that the running automation stop at its next check.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears the flag. Call before starting a new run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(probe) = &self.key_probe {
            if probe() {
                self.flag.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    /// Returns `Err(Interrupted)` if a stop has been requested.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.is_stop_requested() {
            Err(EngineError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` in slices of at most `quantum`, checking the
    /// flag before each slice.
    pub fn sleep(&self, duration: Duration, quantum: Duration) -> Result<(), EngineError> {
        let quantum = quantum.max(MIN_QUANTUM);
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(quantum));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_request_and_reset() {
        let monitor = InterruptMonitor::new();
        assert!(!monitor.is_stop_requested());

        let remote = monitor.clone();
        remote.request_stop();
        assert!(monitor.is_stop_requested());
        assert_eq!(monitor.checkpoint(), Err(EngineError::Interrupted));

        monitor.reset();
        assert!(!remote.is_stop_requested());
        assert!(monitor.checkpoint().is_ok());
    }

    #[test]
    fn test_sleep_completes_without_stop() {
        let monitor = InterruptMonitor::new();
        let start = Instant::now();
        monitor
            .sleep(Duration::from_millis(60), Duration::from_millis(10))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_sleep_wakes_within_quantum() {
        let monitor = InterruptMonitor::new();
        let remote = monitor.clone();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.request_stop();
        });

        let start = Instant::now();
        let result = monitor.sleep(Duration::from_secs(10), Duration::from_millis(20));
        let elapsed = start.elapsed();
        stopper.join().unwrap();

        assert_eq!(result, Err(EngineError::Interrupted));
        assert!(
            elapsed < Duration::from_millis(500),
            "sleep should end shortly after the stop request, took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_sleep_refuses_when_already_stopped() {
        let monitor = InterruptMonitor::new();
        monitor.request_stop();
        let start = Instant::now();
        assert_eq!(
            monitor.sleep(Duration::from_secs(5), Duration::from_millis(30)),
            Err(EngineError::Interrupted)
        );
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_key_probe_latches() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let monitor = InterruptMonitor::new().with_key_probe(move || {
            counter.fetch_add(1, Ordering::SeqCst) >= 2
        });

        assert!(!monitor.is_stop_requested());
        assert!(!monitor.is_stop_requested());
        assert!(monitor.is_stop_requested());
        // Latched: the flag stays set without asking the probe again.
        let before = polls.load(Ordering::SeqCst);
        assert!(monitor.is_stop_requested());
        assert_eq!(polls.load(Ordering::SeqCst), before);
    }
}
