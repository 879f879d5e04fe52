//! Cooperative cancellation for a single dubbing run.
//!
//! The token is a set-once flag backed by a `watch` channel so that waiting on
//! it can be raced against a timer instead of sleeping blindly.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shared stop signal for one run
///
/// Clones observe the same flag. Any holder may request cancellation; only the
/// orchestrator acts on it.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation
    ///
    /// Returns `true` if this call set the flag, `false` if it was already set.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so wait_for cannot fail here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Wait up to `timeout` for cancellation
    ///
    /// Returns `true` as soon as the token is cancelled, `false` if the timeout
    /// elapsed first.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        tokio::time::timeout(timeout, self.cancelled()).await.is_ok()
    }
}
