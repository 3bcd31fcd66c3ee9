use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::services::platform::PlatformClient;
use crate::services::sync;

/// Spawns the two periodic jobs and blocks until shutdown is requested.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let platform = PlatformClient::from_settings(state.settings())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![
        tokio::spawn(course_refresh_loop(state.clone(), platform.clone(), shutdown_rx.clone())),
        tokio::spawn(submission_sync_loop(state.clone(), platform, shutdown_rx)),
    ];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn course_refresh_loop(
    state: AppState,
    platform: PlatformClient,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_secs(
        state.settings().sync().course_refresh_interval_seconds,
    ));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = sync::refresh_all_courses(state.db(), &platform).await {
                    tracing::error!(error = %err, "Course refresh pass failed");
                }
            }
        }
    }
}

async fn submission_sync_loop(
    state: AppState,
    platform: PlatformClient,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_secs(
        state.settings().sync().submission_refresh_interval_seconds,
    ));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) =
                    sync::sync_in_grading(state.db(), &platform, state.settings()).await
                {
                    tracing::error!(error = %err, "Submission sync pass failed");
                }
            }
        }
    }
}
