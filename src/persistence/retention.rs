//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting expired OTP records, chat
//! messages past their TTL, and notifications older than
//! `retention_days`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::Result;

use super::db::Database;
use super::message_repo::MessageRepo;
use super::notification_repo::NotificationRepo;
use super::otp_repo::OtpRepo;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly. Terminal-state tasks and decided applications
/// are deliberately kept — they feed history and ratings.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    config: RetentionConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, &config).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Run one purge pass.
///
/// # Errors
///
/// Returns `AppError::Db` if any delete fails.
pub async fn purge(db: &Arc<Database>, config: &RetentionConfig) -> Result<()> {
    let now = Utc::now();

    let otps = OtpRepo::new(Arc::clone(db)).purge_expired(now).await?;
    let messages = MessageRepo::new(Arc::clone(db)).purge_expired(now).await?;

    let notification_cutoff = now - chrono::Duration::days(i64::from(config.retention_days));
    let notifications = NotificationRepo::new(Arc::clone(db))
        .purge_older_than(notification_cutoff)
        .await?;

    info!(otps, messages, notifications, "retention purge completed");
    Ok(())
}
