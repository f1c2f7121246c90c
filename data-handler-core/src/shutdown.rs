//! Cooperative shutdown signal shared by the producer and consumer loops.
//!
//! A [`ShutdownCoordinator`] is created once per run and passed explicitly to every
//! loop. Loops poll [`ShutdownCoordinator::is_stopped`] between operations and race
//! their suspension points against [`ShutdownCoordinator::wait_for_stop`]. Once
//! signalled, a coordinator never returns to the running state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide stop signal
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    handlers_installed: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Calling this more than once has no further effect.
    pub fn signal_stop(&self) {
        self.token.cancel();
    }

    /// Non-blocking check of the stop flag
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Suspend until a stop is requested
    pub async fn wait_for_stop(&self) {
        self.token.cancelled().await;
    }

    /// Create a coordinator that stops with this one but can also be stopped on its own.
    ///
    /// Stopping the child does not stop the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            handlers_installed: self.handlers_installed.clone(),
        }
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `true` if the full duration elapsed and `false` if the sleep was cut
    /// short by the stop signal.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Listen for SIGINT and SIGTERM and turn either into [`Self::signal_stop`].
    ///
    /// Handlers are installed once; later calls return `None`.
    pub fn install_signal_handlers(&self) -> Option<JoinHandle<()>> {
        if self.handlers_installed.swap(true, Ordering::SeqCst) {
            return None;
        }

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = coordinator.wait_for_stop() => return,
                name = wait_for_termination() => {
                    info!(signal = name, "Received shutdown signal");
                }
            }
            coordinator.signal_stop();
        }))
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to register SIGTERM handler, listening for SIGINT only");
            return wait_for_interrupt().await;
        }
    };

    tokio::select! {
        name = wait_for_interrupt() => name,
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    wait_for_interrupt().await
}

async fn wait_for_interrupt() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
