//! Process signal handling

use meshsync_common::ShutdownSignal;
use tracing::{error, info};

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Trigger `shutdown` on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c() => info!("Received Ctrl+C, initiating graceful shutdown..."),
            _ = terminate() => info!("Received SIGTERM, initiating graceful shutdown..."),
        }
        shutdown.shutdown();
    });
}
