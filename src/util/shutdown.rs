//! Graceful shutdown handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Fans a single shutdown request out to every long-lived task.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal manager.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            tracing::info!(receivers = self.sender.receiver_count(), "shutdown requested");
            let _ = self.sender.send(());
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_notified() {
        let signal = ShutdownSignal::new();
        let mut a = signal.subscribe();
        let mut b = signal.clone().subscribe();

        signal.shutdown();

        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_shutdown_without_subscribers() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        signal.shutdown();
        assert!(signal.is_triggered());
    }
}
