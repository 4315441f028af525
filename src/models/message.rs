//! Task-scoped chat message model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message exchanged between a task's collaborators.
///
/// Messages are persisted before any realtime broadcast; clients that
/// miss the broadcast reconcile by fetching the task's message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatMessage {
    /// Unique record identifier.
    pub id: String,
    /// Task the conversation belongs to.
    pub task_id: String,
    /// Sending user.
    pub sender_id: String,
    /// Receiving user.
    pub receiver_id: String,
    /// Message body (bounded at 1000 chars by the sender path).
    pub content: String,
    /// Whether the receiver has read the message.
    pub read: bool,
    /// When the receiver read the message.
    pub read_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Purge deadline; retention deletes the row after this.
    pub expires_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Construct an unread message expiring `ttl_days` from now.
    #[must_use]
    pub fn new(
        task_id: String,
        sender_id: String,
        receiver_id: String,
        content: String,
        ttl_days: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            sender_id,
            receiver_id,
            content,
            read: false,
            read_at: None,
            created_at: now,
            expires_at: now + Duration::days(i64::from(ttl_days)),
        }
    }
}
