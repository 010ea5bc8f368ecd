//! Bridges operating system termination signals to the shutdown channel.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::concurrency::shutdown::ShutdownTx;

/// Spawns a task that triggers shutdown on SIGINT (ctrl+c) or SIGTERM.
///
/// The returned handle never completes on its own unless a signal arrives; the caller aborts it
/// once the run is over.
pub fn spawn_signal_bridge(shutdown_tx: ShutdownTx) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        shutdown_tx.shutdown();
    })
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            warn!(error = %err, "failed to register sigterm handler, only sigint will stop the export");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for sigint");
                std::future::pending::<()>().await;
            }
            info!("sigint (ctrl+c) received, shutting down export");
        }
        _ = async {
            match sigterm.as_mut() {
                Some(sigterm) => { sigterm.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => {
            info!("sigterm received, shutting down export");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("sigint (ctrl+c) received, shutting down export"),
        Err(err) => {
            warn!(error = %err, "failed to listen for sigint");
            std::future::pending::<()>().await;
        }
    }
}
