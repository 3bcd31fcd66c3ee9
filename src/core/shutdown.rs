use tokio::signal;

/// Completes once the process is asked to stop. The scheduler awaits this
/// before broadcasting shutdown to the periodic jobs.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
                tracing::info!(signal = "ctrl_c", "Stopping periodic jobs");
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {
                tracing::info!(signal = "ctrl_c", "Stopping periodic jobs");
            }
            _ = sigterm.recv() => {
                tracing::info!(signal = "sigterm", "Stopping periodic jobs");
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
        tracing::info!(signal = "ctrl_c", "Stopping periodic jobs");
    }
}

async fn wait_for_ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
