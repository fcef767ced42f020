//! Change notification for state observers
//!
//! Components bump a shared revision after every state write; the
//! presentation layer waits on it and re-reads the view.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct ChangeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|revision| *revision += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_each_revision() {
        let signal = ChangeSignal::new();
        let mut rx = signal.subscribe();
        assert!(!rx.has_changed().unwrap());

        signal.notify();
        signal.clone().notify();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 2);
        assert_eq!(signal.revision(), 2);
    }
}
