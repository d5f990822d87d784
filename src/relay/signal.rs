//! Single-slot rendezvous signal
//!
//! A binary semaphore on top of a `crossbeam_channel::bounded(1)`:
//! raising never blocks, a raise with nobody waiting is remembered for
//! exactly one later wait, and repeated raises coalesce into one.
//!
//! ```text
//!   caller                      worker
//!     │  raise(to_worker) ─────────▶│
//!     │                             │  (work)
//!     │◀───────── raise(to_caller)  │
//!   wait(to_caller)               wait(to_worker)
//! ```

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::{Duration, Instant};

/// Result of waiting on a [`Signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was raised and consumed
    Signaled,
    /// The timeout elapsed first
    TimedOut,
    /// The signal can no longer be raised
    Disconnected,
}

/// Auto-reset, single-slot signal
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Raise the signal; returns false if it was already raised
    pub fn raise(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Block until the signal is raised or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => WaitOutcome::Signaled,
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Disconnected,
        }
    }

    /// Drop a pending raise, if any; returns true if one was pending
    pub fn clear(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    pub fn is_raised(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Raise `self`, then wait on `other`
    pub fn signal_and_wait(&self, other: &Signal, timeout: Duration) -> WaitOutcome {
        self.raise();
        other.wait(timeout)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Joint wait: block until both `a` and `b` are raised within one deadline
///
/// Either both raises are consumed or neither is: if the second wait fails,
/// the first signal is put back.
pub fn wait_both(a: &Signal, b: &Signal, timeout: Duration) -> WaitOutcome {
    let deadline = Instant::now() + timeout;

    let first = a.wait(timeout);
    if first != WaitOutcome::Signaled {
        return first;
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    let second = b.wait(remaining);
    if second != WaitOutcome::Signaled {
        a.raise();
    }
    second
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_raise_is_remembered_once() {
        let signal = Signal::new();
        assert!(signal.raise());
        assert!(!signal.raise());

        assert_eq!(signal.wait(Duration::from_millis(10)), WaitOutcome::Signaled);
        assert_eq!(signal.wait(Duration::from_millis(10)), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_clear() {
        let signal = Signal::new();
        assert!(!signal.clear());
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.clear());
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_signal_and_wait_across_threads() {
        let ping = Signal::new();
        let pong = Signal::new();

        let (p, q) = (ping.clone(), pong.clone());
        let echo = thread::spawn(move || {
            assert_eq!(p.wait(Duration::from_secs(2)), WaitOutcome::Signaled);
            q.raise();
        });

        assert_eq!(
            ping.signal_and_wait(&pong, Duration::from_secs(2)),
            WaitOutcome::Signaled
        );
        echo.join().unwrap();
    }

    #[test]
    fn test_wait_both_puts_back_on_timeout() {
        let a = Signal::new();
        let b = Signal::new();
        a.raise();

        assert_eq!(wait_both(&a, &b, Duration::from_millis(20)), WaitOutcome::TimedOut);
        assert!(a.is_raised());

        b.raise();
        assert_eq!(wait_both(&a, &b, Duration::from_millis(20)), WaitOutcome::Signaled);
        assert!(!a.is_raised());
        assert!(!b.is_raised());
    }
}
