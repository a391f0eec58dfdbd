//! Process-wide cancellation signal.
//!
//! One [`ShutdownTrigger`] fans out to any number of [`Shutdown`] handles.
//! The signal is level-triggered: a handle cloned after the trigger fired
//! still observes it.

use tokio::sync::watch;

/// Creates a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. A dropped trigger counts
    /// as a request.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Waits for Ctrl-C, or SIGTERM on unix, and returns the signal name.
pub async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_every_handle() {
        let (trigger, shutdown) = channel();
        let other = shutdown.clone();
        assert!(!shutdown.is_triggered());

        trigger.trigger();
        shutdown.cancelled().await;
        other.cancelled().await;
        assert!(trigger.subscribe().is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_until_triggered() {
        let (_trigger, shutdown) = channel();
        let waited = tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn dropped_trigger_counts_as_cancellation() {
        let (trigger, shutdown) = channel();
        drop(trigger);
        shutdown.cancelled().await;
    }
}
