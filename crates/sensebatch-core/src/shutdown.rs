//! Interrupt handling for long-running loops.
//!
//! Loops hold a `watch::Receiver<bool>` and check it between units, so an
//! interrupt never leaves a unit half-updated.

use tokio::sync::watch;

/// Spawn a task that flips the returned receiver to `true` on Ctrl-C or,
/// on Unix, SIGTERM.
pub fn listen_for_signals() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, stopping after the current unit");
        let _ = tx.send(true);
    });
    rx
}

pub fn requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Sleep for `period`, returning early with `true` if shutdown is requested.
/// A dropped sender counts as "never interrupted".
pub async fn sleep_or_shutdown(
    period: std::time::Duration,
    rx: &mut watch::Receiver<bool>,
) -> bool {
    if requested(rx) {
        return true;
    }
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return requested(rx),
            changed = rx.changed() => match changed {
                Ok(()) if requested(rx) => return true,
                Ok(()) => continue,
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install SIGTERM handler, Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
