//! Periodic failed-notification scan.
//!
//! Failures discovered after the fact are retried through the explicit
//! `RetryFailedNotification` command, never automatically by the bus. Only
//! requests still below the retry cap are picked up.

use std::sync::Arc;
use std::time::Duration;

use domain_notifications::queries;
use domain_notifications::{
    Command, MessageBus, RequestStore, RetryFailedNotification, DEFAULT_MAX_RETRIES,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Run the scan every `interval` until the shutdown signal flips.
pub async fn run_retry_scan(
    bus: Arc<MessageBus>,
    request_store: Arc<dyn RequestStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> eyre::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = scan_once(&bus, request_store.as_ref()).await {
                    error!(error = %e, "Failed-notification scan errored");
                }
            }
        }
    }

    info!("Retry scan stopped");
    Ok(())
}

/// One pass: issue a retry command for every eligible failed request.
async fn scan_once(bus: &MessageBus, request_store: &dyn RequestStore) -> eyre::Result<()> {
    let failed = queries::failed_notifications(request_store, DEFAULT_MAX_RETRIES).await?;
    if failed.is_empty() {
        return Ok(());
    }

    info!(count = failed.len(), "Retrying failed notifications");
    for item in failed {
        let command = Command::RetryFailedNotification(RetryFailedNotification {
            notification_id: item.notification_id.clone(),
        });
        if let Err(e) = bus.handle(command).await {
            error!(
                notification_id = %item.notification_id,
                error = %e,
                "Retry command failed"
            );
        }
    }
    Ok(())
}
