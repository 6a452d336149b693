//! One-shot broadcast stop signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Close notification observable by any number of waiters.
///
/// Firing is idempotent and waiting on an already-fired signal returns immediately.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn all_waiters_observe_fire() {
        let stop = StopSignal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let s = stop.clone();
                tokio::spawn(async move { s.wait().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(5)).await;
        stop.fire();
        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn firing_twice_is_harmless_and_late_waiters_return() {
        let stop = StopSignal::new();
        assert!(!stop.is_fired());
        stop.fire();
        stop.fire();
        assert!(stop.is_fired());
        tokio::time::timeout(Duration::from_millis(100), stop.wait()).await.unwrap();
    }
}
