//! Shutdown signal handling for the metanode process.

use crate::error::Result;
use tracing::info;

/// Wait until the process is asked to stop.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
        _ = sigquit.recv() => {
            info!("Received SIGQUIT");
        }
    }
    Ok(())
}

/// Wait until the process is asked to stop (Windows version).
#[cfg(windows)]
pub async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
