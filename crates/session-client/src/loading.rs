//! In-flight request signal.
//!
//! The count is published over a `watch` channel so UI code can subscribe
//! to "request in flight" changes. Every increment is paired with a
//! [`LoadingGuard`] whose drop performs the decrement.

use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide count of requests started but not yet finished.
#[derive(Debug, Clone)]
pub struct LoadingSignal {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for LoadingSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Mark a request as started.
    pub fn begin(&self) -> LoadingGuard {
        self.tx.send_modify(|count| *count += 1);
        LoadingGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight() > 0
    }

    /// Receive every change of the in-flight count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the request"]
pub struct LoadingGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|count| *count = count.saturating_sub(1));
    }
}
