//! Explicit cancellation signal for in-flight provider calls.
//!
//! A [`CancelHandle`] / [`CancelSignal`] pair wraps a `tokio::sync::watch`
//! channel. The handle lives with whoever owns the inbound request (the HTTP
//! handler future); the signal travels with the provider call. Dropping the
//! handle cancels, so a disconnected client abandons the upstream call
//! instead of leaving it to finish unobserved.

use tokio::sync::watch;

/// Owner side of a cancellation pair. Cancels on drop.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired [`CancelSignal`].
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl CancelSignal {
    /// A signal that never fires (for callers with no cancellation source).
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolve once cancellation is requested or the handle is gone.
    ///
    /// Pends forever for [`CancelSignal::never`].
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_resolves_signal() {
        let (handle, mut signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("signal must fire");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("drop must cancel");
    }

    #[tokio::test]
    async fn test_never_signal_does_not_fire() {
        let mut signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
    }
}
