//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT → trigger graceful shutdown
//! - SIGHUP → request an immediate apply

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;

/// Translate signals into shutdown and apply requests until shutdown.
#[cfg(unix)]
pub async fn handle_signals(
    shutdown: Shutdown,
    apply_tx: mpsc::UnboundedSender<()>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, scheduling apply");
                if apply_tx.send(()).is_err() {
                    break;
                }
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn handle_signals(
    shutdown: Shutdown,
    _apply_tx: mpsc::UnboundedSender<()>,
) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down");
    shutdown.trigger();
    Ok(())
}
