//! Process-wide stop signal.
//!
//! One `Shutdown` is created by the daemon and cloned into the scheduler
//! (every per-service probe timer), the admin server and the reload loop.
//! Triggering it is latched: a timer registered after the signal fired sees
//! it through [`Shutdown::is_triggered`] even though it subscribed too late
//! to receive the broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cloneable stop signal shared by the monitor's long-running tasks.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver that yields once the signal fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            tracing::debug!(listeners = self.tx.receiver_count(), "Shutdown triggered");
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Tasks currently waiting on the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_signal() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        let mut rx = shutdown.subscribe();

        assert_eq!(clone.receiver_count(), 1);
        assert!(!shutdown.is_triggered());
        clone.trigger();
        assert!(rx.recv().await.is_ok());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_trigger_is_latched_once() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.trigger();
        shutdown.trigger();

        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());

        let late = shutdown.subscribe();
        assert!(late.is_empty());
        assert!(shutdown.is_triggered());
    }
}
