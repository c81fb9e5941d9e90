//! One-shot session readiness.
//!
//! The bridge fires a [`ReadySignal`] once its transport is open.
//! Producers hold a [`ReadyWaiter`] and must not enqueue before it
//! completes. If the signal is dropped without firing, waiters get
//! [`Error::SessionClosed`].

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;

use crate::error::{Error, Result};

// ============================================================================
// Constructor
// ============================================================================

/// Creates a linked signal and waiter.
#[must_use]
pub fn readiness() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal { tx }, ReadyWaiter { rx })
}

// ============================================================================
// ReadySignal
// ============================================================================

/// Fires readiness exactly once.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    /// Marks the session ready and wakes every waiter.
    pub fn fire(self) {
        self.tx.send_replace(true);
    }
}

// ============================================================================
// ReadyWaiter
// ============================================================================

/// Waits for readiness. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

impl ReadyWaiter {
    /// Waits until the session is ready.
    ///
    /// Returns immediately if readiness already fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the signal was dropped unfired.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.rx.clone();
        rx.wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::SessionClosed)
    }

    /// Returns `true` once readiness has fired.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test]
    async fn test_wait_after_fire_returns() {
        let (signal, waiter) = readiness();
        assert!(!waiter.is_ready());

        signal.fire();

        assert!(waiter.is_ready());
        waiter.wait().await.unwrap();
        waiter.clone().wait().await.unwrap();
    }

    #[test]
    fn test_wait_pends_until_fired() {
        let (signal, waiter) = readiness();
        let mut wait = task::spawn(waiter.wait());

        assert_pending!(wait.poll());
        signal.fire();
        assert!(wait.is_woken());
        assert_ready_ok!(wait.poll());
    }

    #[tokio::test]
    async fn test_dropped_signal_fails_waiters() {
        let (signal, waiter) = readiness();
        drop(signal);

        assert!(matches!(waiter.wait().await, Err(Error::SessionClosed)));
    }
}
