//! Process signal handling.
//!
//! SIGINT or SIGTERM delivered to the relay interrupts the correction
//! client; if it is still running after the grace period it is killed.

use std::sync::Arc;
use std::time::Duration;

use lpp_relay_runtime::ProcessSupervisor;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Forward a termination request to the client until `cancel_token` fires.
pub async fn forward_shutdown(
    supervisor: Arc<ProcessSupervisor>,
    grace: Duration,
    cancel_token: CancellationToken,
) {
    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed installing signal handlers");
                return;
            }
        };

    tokio::select! {
        () = cancel_token.cancelled() => return,
        _ = sigint.recv() => info!("received SIGINT, interrupting correction client"),
        _ = sigterm.recv() => info!("received SIGTERM, interrupting correction client"),
    }
    supervisor.interrupt().await;
    kill_after_grace(&supervisor, grace, &cancel_token).await;
}

/// Kill the client if it is still running once `grace` has passed.
///
/// Returns early when `cancel_token` fires, which happens as soon as the
/// client has exited.
pub async fn kill_after_grace(
    supervisor: &ProcessSupervisor,
    grace: Duration,
    cancel_token: &CancellationToken,
) {
    tokio::select! {
        () = cancel_token.cancelled() => {}
        () = tokio::time::sleep(grace) => {
            warn!(grace = ?grace, "correction client still running, killing it");
            supervisor.quit().await;
        }
    }
}
