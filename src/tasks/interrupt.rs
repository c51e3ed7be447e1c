//! Interrupt Listener Task
//!
//! Bridges process signals to the cooperative [`ShutdownSignal`].

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::scan::ShutdownSignal;

/// Spawns a task that triggers `shutdown` on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed that source is ignored; the task then
/// waits on the other one.
///
/// # Returns
/// Handle that completes once `shutdown` has been triggered, by a signal or
/// by any other holder
pub fn spawn_interrupt_listener(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, stopping scan dispatch...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping scan dispatch...");
            }
            _ = shutdown.cancelled() => {
                return;
            }
        }

        shutdown.trigger();
    })
}
