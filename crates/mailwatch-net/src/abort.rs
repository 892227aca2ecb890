//! Cooperative cancellation for blocked transport calls.
//!
//! An [`AbortHandle`] is held by whoever may need to interrupt a fetch; the
//! transport owns an [`AbortSignal`] and races every read and write against
//! it.

use std::sync::Arc;

use tokio::sync::watch;

/// Fires the abort for every signal derived from it.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    /// Creates an unfired handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the abort.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Re-arms the handle for a new run.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Returns true if the abort has fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Creates a signal observing this handle.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of an [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns true if the abort has fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the abort fires. Pending forever if the handle is
    /// dropped unfired.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_wakes_waiter() {
        let handle = AbortHandle::new();
        let mut signal = handle.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        tokio::task::yield_now().await;
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_aborted());
    }

    #[tokio::test]
    async fn test_already_fired() {
        let handle = AbortHandle::new();
        handle.abort();
        let mut signal = handle.signal();
        assert!(signal.is_aborted());
        signal.aborted().await;
    }

    #[tokio::test]
    async fn test_reset() {
        let handle = AbortHandle::new();
        handle.abort();
        handle.reset();
        assert!(!handle.signal().is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fires() {
        let mut signal = AbortSignal::never();
        let result = tokio::time::timeout(Duration::from_secs(3600), signal.aborted()).await;
        assert!(result.is_err());
    }
}
