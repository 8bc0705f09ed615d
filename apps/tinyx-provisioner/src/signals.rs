use std::io;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl+C or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        match interrupted().await {
            Ok(name) => tracing::info!(signal = name, "Cancelling provisioning"),
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!(error = %e, "Ctrl+C handler failed, run cannot be cancelled");
                    return;
                }
                tracing::info!(signal = "SIGINT", "Cancelling provisioning");
            }
        }
        token.cancel();
    });
}

/// Resolves with the name of the first interrupting signal.
#[cfg(unix)]
async fn interrupted() -> io::Result<&'static str> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn interrupted() -> io::Result<&'static str> {
    signal::ctrl_c().await.map(|()| "SIGINT")
}
