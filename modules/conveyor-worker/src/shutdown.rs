//! Cooperative exit flag, set once by a terminal signal and observed by the
//! lifecycle loop, the between-attempt sleep, and in-flight executions.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Setter half, held by the signal listener (or a test).
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn set(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl Shutdown {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is set. If the setter is gone with the flag
    /// still clear, nothing can fire anymore and this never resolves.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|set| *set).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration`, cancellable by the exit flag. Returns true
    /// when the sleep was interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wait() => true,
        }
    }
}

/// Install handlers for SIGTERM, SIGHUP, and SIGINT that set the exit flag.
pub fn install() -> anyhow::Result<Shutdown> {
    use tokio::signal::unix::{signal, SignalKind};
    let (handle, shutdown) = channel();
    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut int = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        let received = tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = hup.recv() => "SIGHUP",
            _ = int.recv() => "SIGINT",
        };
        warn!(signal = received, "terminal signal received, shutting down");
        handle.set();
        // Keep the sender alive so the flag stays observable.
        std::future::pending::<()>().await;
    });
    Ok(shutdown)
}
