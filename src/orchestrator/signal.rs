//! Mission-level cancellation, propagated to in-flight task workers.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancel switch. Workers subscribe and abort at their next
/// suspension point; a pending gateway call's result is discarded.
#[derive(Clone)]
pub struct SignalHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for SignalHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}
