//! Readiness gate: wait for a store's first successful connection.
//!
//! Callers that need a handle before the underlying store has connected
//! park on the gate and are woken the moment the handle exists. The gate is
//! built on [`tokio::sync::watch`], so waiting suspends the task instead of
//! spinning, and a waiter that subscribes after the gate opened resolves
//! immediately -- there are no lost wakeups.
//!
//! Multiple concurrent waiters are all resolved by a single `open`; no
//! ordering among them is guaranteed or required. `wait` has no deadline by
//! default -- an unreachable store keeps its callers parked indefinitely.
//! [`ReadinessGate::wait_with_deadline`] is available for callers that want
//! a bound.

use std::time::Duration;

use tokio::sync::watch;

/// Errors surfaced by gate waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The gate was dropped while a caller was waiting on it.
    #[error("readiness gate closed before a handle was published")]
    Closed,

    /// A deadline-bounded wait ran out of time.
    #[error("readiness gate wait deadline elapsed")]
    DeadlineElapsed,
}

/// A single-store readiness gate holding the handle once it exists.
///
/// The handle type is `Clone` because every resolved waiter receives its
/// own copy (pool and client handles are cheap reference-counted clones in
/// all the drivers this broker fronts).
#[derive(Debug)]
pub struct ReadinessGate<T: Clone> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> ReadinessGate<T> {
    /// Create a closed gate with no handle published.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish the handle and wake every pending waiter.
    ///
    /// Re-opening an already-open gate replaces the stored handle; waiters
    /// that already resolved keep the copy they were given.
    pub fn open(&self, handle: T) {
        // send_replace stores the handle even with zero receivers parked
        // (plain send discards it); a waiter subscribing later reads the
        // stored value immediately.
        let _ = self.tx.send_replace(Some(handle));
    }

    /// Whether a handle has been published.
    pub fn is_open(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Return a copy of the handle without suspending, if one exists.
    pub fn try_get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Suspend until a handle is published, then return a copy of it.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Closed`] if the gate is dropped mid-wait.
    pub async fn wait(&self) -> Result<T, GateError> {
        let mut rx = self.tx.subscribe();
        let value = rx
            .wait_for(|v| v.is_some())
            .await
            .map_err(|_| GateError::Closed)?;
        value.clone().ok_or(GateError::Closed)
    }

    /// Like [`ReadinessGate::wait`], but give up after `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::DeadlineElapsed`] if no handle was published in
    /// time, or [`GateError::Closed`] if the gate was dropped mid-wait.
    pub async fn wait_with_deadline(&self, deadline: Duration) -> Result<T, GateError> {
        tokio::time::timeout(deadline, self.wait())
            .await
            .map_err(|_| GateError::DeadlineElapsed)?
    }
}

impl<T: Clone> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
