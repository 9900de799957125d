//! Scheduled cleanup of expired records.
//!
//! Reads already treat lapsed verification records as absent and expired
//! refresh tokens are purged on touch; the sweeper bounds table growth for
//! rows that are never touched again.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs. Verification records live for minutes,
/// so the sweep runs considerably more often than the refresh-token window.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.verifications().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired verification records", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up verification records: {}", e),
    }

    match db.refresh_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up refresh tokens: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
