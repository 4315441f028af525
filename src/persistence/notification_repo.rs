//! Notification repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::notification::{Notification, NotificationKind};
use crate::{AppError, Result};

use super::db::Database;
use super::parse_timestamp;

/// Repository wrapper around `SQLite` for notification records.
#[derive(Clone)]
pub struct NotificationRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    title: String,
    body: String,
    task_id: Option<String>,
    application_id: Option<String>,
    message_id: Option<String>,
    read: i64,
    created_at: String,
}

impl NotificationRow {
    /// Convert a database row into the domain model.
    fn into_notification(self) -> Result<Notification> {
        let kind = parse_kind(&self.kind)?;

        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind,
            title: self.title,
            body: self.body,
            task_id: self.task_id,
            application_id: self.application_id,
            message_id: self.message_id,
            read: self.read != 0,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}

fn parse_kind(s: &str) -> Result<NotificationKind> {
    match s {
        "help_request" => Ok(NotificationKind::HelpRequest),
        "helper_approved" => Ok(NotificationKind::HelperApproved),
        "helper_rejected" => Ok(NotificationKind::HelperRejected),
        "task_update" => Ok(NotificationKind::TaskUpdate),
        "task_cancelled" => Ok(NotificationKind::TaskCancelled),
        "chat_message" => Ok(NotificationKind::ChatMessage),
        "urgent_nearby" => Ok(NotificationKind::UrgentNearby),
        other => Err(AppError::Db(format!("invalid notification kind: {other}"))),
    }
}

impl NotificationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new notification record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, notification: &Notification) -> Result<Notification> {
        sqlx::query(
            "INSERT INTO notification (id, user_id, kind, title, body, task_id,
             application_id, message_id, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.task_id)
        .bind(&notification.application_id)
        .bind(&notification.message_id)
        .bind(i64::from(notification.read))
        .bind(notification.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(notification.clone())
    }

    /// List a user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT * FROM notification WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(NotificationRow::into_notification)
            .collect()
    }

    /// Purge notifications created before `before`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_older_than(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notification WHERE created_at < ?1")
            .bind(before.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
