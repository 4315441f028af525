//! Chat message repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::message::ChatMessage;
use crate::Result;

use super::db::Database;
use super::{parse_timestamp, parse_timestamp_opt};

/// Repository wrapper around `SQLite` for chat message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    task_id: String,
    sender_id: String,
    receiver_id: String,
    content: String,
    read: i64,
    read_at: Option<String>,
    created_at: String,
    expires_at: String,
}

impl MessageRow {
    /// Convert a database row into the domain model.
    fn into_message(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: self.id,
            task_id: self.task_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            read: self.read != 0,
            read_at: parse_timestamp_opt(self.read_at.as_deref(), "read_at")?,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            expires_at: parse_timestamp(&self.expires_at, "expires_at")?,
        })
    }
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new chat message record.
    ///
    /// Persistence happens before any realtime broadcast; this row is
    /// the durable copy clients reconcile against.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, message: &ChatMessage) -> Result<ChatMessage> {
        sqlx::query(
            "INSERT INTO chat_message (id, task_id, sender_id, receiver_id, content,
             read, read_at, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&message.id)
        .bind(&message.task_id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(i64::from(message.read))
        .bind(message.read_at.map(|dt| dt.to_rfc3339()))
        .bind(message.created_at.to_rfc3339())
        .bind(message.expires_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(message.clone())
    }

    /// List a task's messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM chat_message WHERE task_id = ?1 ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Mark every unread message addressed to `receiver_id` in a task
    /// as read. Returns the number of messages marked.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_read(&self, task_id: &str, receiver_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE chat_message SET read = 1, read_at = ?1
             WHERE task_id = ?2 AND receiver_id = ?3 AND read = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .bind(receiver_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    /// Purge messages past their expiry.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_message WHERE expires_at < ?1")
            .bind(before.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
