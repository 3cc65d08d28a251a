//! Coordinated shutdown.
//!
//! `main` owns a [`Coordinator`] and hands a [`Signal`] to everything that
//! must wind down before the process exits. [`Coordinator::shutdown`] wakes
//! every signal and then waits until all of them have been dropped.

use tokio::sync::{mpsc, watch};

#[derive(Debug)]
pub struct Coordinator {
    notify: watch::Sender<bool>,
    alive_tx: mpsc::Sender<()>,
    alive_rx: mpsc::Receiver<()>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        let (alive_tx, alive_rx) = mpsc::channel(1);

        Self {
            notify,
            alive_tx,
            alive_rx,
        }
    }

    pub fn subscribe(&self) -> Signal {
        Signal {
            notify: self.notify.subscribe(),
            _alive: self.alive_tx.clone(),
        }
    }

    /// Notify every signal, then wait for all of them to be dropped.
    pub async fn shutdown(mut self) {
        self.notify.send_replace(true);

        drop(self.alive_tx);
        // nothing is ever sent, so this returns once every clone is gone
        let _ = self.alive_rx.recv().await;
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle that is notified on shutdown and holds the shutdown open until
/// dropped.
#[derive(Clone, Debug)]
pub struct Signal {
    notify: watch::Receiver<bool>,
    _alive: mpsc::Sender<()>,
}

impl Signal {
    pub fn is_shutdown(&self) -> bool {
        *self.notify.borrow()
    }

    /// Wait until shutdown has been requested. Also returns if the
    /// coordinator was dropped without shutting down.
    pub async fn recv(mut self) {
        let _ = self.notify.wait_for(|stopping| *stopping).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn signals_are_notified() {
        let coordinator = Coordinator::new();
        let signal = coordinator.subscribe();
        assert!(!signal.is_shutdown());

        let watcher = tokio::spawn(signal.recv());
        coordinator.shutdown().await;

        timeout(Duration::from_secs(1), watcher)
            .await
            .expect("signal woke")
            .expect("watcher task");
    }

    #[tokio::test]
    async fn shutdown_waits_for_signals_to_drop() {
        let coordinator = Coordinator::new();
        let signal = coordinator.subscribe();
        let held = signal.clone();

        let stop = tokio::spawn(coordinator.shutdown());
        tokio::task::yield_now().await;
        assert!(held.is_shutdown());
        assert!(!stop.is_finished());

        drop(signal);
        drop(held);

        timeout(Duration::from_secs(1), stop)
            .await
            .expect("shutdown finished")
            .expect("shutdown task");
    }
}
