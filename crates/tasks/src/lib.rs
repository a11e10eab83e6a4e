//! Cooperative cancellation for long-running tasks.
//!
//! A [`ShutdownSignal`] is held by whoever decides when the process stops;
//! each task gets a [`ShutdownGuard`] and checks it between units of work or
//! races it against its own futures. Dropping every signal handle counts as
//! a shutdown request, so tasks never outlive their owner.

use std::{future, sync::Arc};

use tokio::{signal::ctrl_c, sync::watch, task::JoinHandle};
use tracing::{info, warn};

/// Owner side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Asks every guard to stop. Idempotent.
    pub fn send(&self) {
        let changed = self.tx.send_if_modified(|triggered| {
            let was = *triggered;
            *triggered = true;
            !was
        });
        if changed {
            info!("shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownGuard {
        ShutdownGuard {
            rx: self.tx.subscribe(),
        }
    }
}

/// Task side of the shutdown channel.
///
/// A guard only stays quiet while some [`ShutdownSignal`] clone is alive.
/// Once the last one is dropped the guard reports shutdown, so a guard taken
/// from a temporary (`ShutdownSignal::new().subscribe()`) is shut down from
/// the start. Bind the signal for as long as the task should run.
#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    rx: watch::Receiver<bool>,
}

impl ShutdownGuard {
    /// Whether the task should stop at the next opportunity.
    pub fn should_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown is requested or the signal is gone.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.rx.clone();
        // an error means every sender was dropped
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Triggers `signal` on the first SIGINT, or SIGTERM on unix.
pub fn start_signal_listeners(signal: &ShutdownSignal) -> JoinHandle<()> {
    let signal = signal.clone();
    tokio::spawn(async move {
        wait_for_os_signal().await;
        signal.send();
    })
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, only SIGINT stops the process");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = term.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match ctrl_c().await {
        Ok(()) => info!("received SIGINT"),
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGINT");
            // without a listener the process only stops through its signal
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;

    #[tokio::test]
    async fn test_guard_observes_signal() {
        let signal = ShutdownSignal::new();
        let guard = signal.subscribe();
        assert!(!guard.should_shutdown());

        let waiter = tokio::spawn({
            let guard = guard.clone();
            async move { guard.wait_for_shutdown().await }
        });

        signal.send();
        signal.send();
        timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(guard.should_shutdown());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_signal_counts_as_shutdown() {
        let signal = ShutdownSignal::new();
        let guard = signal.subscribe();
        drop(signal);

        assert!(guard.should_shutdown());
        timeout(Duration::from_secs(1), guard.wait_for_shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_listener_waits_for_os_signal() {
        let signal = ShutdownSignal::new();
        let guard = signal.subscribe();
        let listener = start_signal_listeners(&signal);

        sleep(Duration::from_millis(20)).await;
        assert!(!signal.is_triggered());
        assert!(!guard.should_shutdown());

        // the listener holds its own handle
        drop(signal);
        assert!(!guard.should_shutdown());

        listener.abort();
        let _ = listener.await;
        assert!(guard.should_shutdown());
    }

    #[tokio::test]
    async fn test_guard_lives_as_long_as_any_signal_clone() {
        let signal = ShutdownSignal::new();
        let guard = signal.subscribe();
        let kept = signal.clone();
        drop(signal);
        assert!(!guard.should_shutdown());

        let temp_guard = ShutdownSignal::new().subscribe();
        assert!(temp_guard.should_shutdown());

        drop(kept);
        assert!(guard.should_shutdown());
    }
}
