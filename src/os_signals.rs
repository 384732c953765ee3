//! # Cross-platform OS signal integration.
//!
//! A coordinator owning a subsystem in a long-lived process usually wants to
//! begin shutdown when the process is told to terminate.
//! [`Stopper::stop_on_signal`] ties the two together;
//! [`wait_for_shutdown_signal`] is the bare helper for callers that stage
//! their own shutdown.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

use crate::stopper::Stopper;

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
            _ = sigquit.recv() => {},
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

impl Stopper {
    /// Blocks until the process receives a termination signal, then performs
    /// a full [`stop`](Stopper::stop).
    ///
    /// Returns `Err` only if signal registration fails; in that case no
    /// shutdown is initiated.
    pub async fn stop_on_signal(&self) -> std::io::Result<()> {
        wait_for_shutdown_signal().await?;
        self.stop().await;
        Ok(())
    }
}
