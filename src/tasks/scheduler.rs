use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::evaluation;

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const STALE_RECOVERY_INTERVAL: Duration = Duration::from_secs(300);

pub(crate) async fn run(state: AppState) -> Result<()> {
    let concurrency = state.settings().worker().concurrency;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(concurrency + 1);
    for worker_id in 0..concurrency {
        handles.push(tokio::spawn(evaluation_worker(state.clone(), worker_id, shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(stale_recovery_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(concurrency, "Evaluation worker started");

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

async fn evaluation_worker(state: AppState, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
    let batch = i64::try_from(state.settings().worker().concurrency).unwrap_or(1).max(1);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match evaluation::evaluate_next_pending(state.pipeline(), batch).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(worker_id, error = %format!("{err:#}"), "Evaluation worker iteration failed")
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(IDLE_POLL_INTERVAL) => {}
        }
    }

    tracing::debug!(worker_id, "Evaluation worker stopped");
}

async fn stale_recovery_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let stale_after = state.settings().worker().stale_after_minutes;
    let mut tick = interval(STALE_RECOVERY_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = evaluation::recover_stale_processing(state.pipeline(), stale_after).await {
                    tracing::error!(error = %format!("{err:#}"), "recover_stale_processing failed");
                }
            }
        }
    }
}
