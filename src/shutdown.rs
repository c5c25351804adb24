use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancels the returned token on SIGTERM or SIGINT.
///
/// The supervision loop and the dashboard watch the token; an interrupted
/// tick is harmless since every job step is a single transaction.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers, shutting down");
                    trigger.cancel();
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping supervision");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping supervision");
            }
        }

        trigger.cancel();
    });

    token
}
