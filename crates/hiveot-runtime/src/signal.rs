//! SIGINT/SIGTERM handling.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolve on SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Spawn a task that, on the first signal, cancels `token`, runs `release` and
/// exits the process.
///
/// Cancelling `token` from elsewhere stops the watcher without exiting.
pub fn exit_on_signal<F>(token: CancellationToken, release: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                info!("shutdown signal received");
                token.cancel();
                release();
                std::process::exit(0);
            }
            _ = token.cancelled() => {}
        }
    });
}
